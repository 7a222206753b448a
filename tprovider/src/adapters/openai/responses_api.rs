//! Responses API payloads: item-based input, typed output items and streaming events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{BuiltinTool, ProviderError, ResponseInputItem, ResponseRequest, Role};

use super::types::{
    OpenAiAssistantMessage, OpenAiFinishReason, OpenAiResponse, OpenAiStreamChunk, OpenAiToolCall,
    OpenAiUsage,
};

pub(crate) fn build_responses_request(
    request: ResponseRequest,
    stream: bool,
) -> Result<ResponsesApiRequest, ProviderError> {
    let input = request
        .input
        .into_iter()
        .map(ResponsesApiInputItem::from)
        .collect::<Vec<_>>();

    let mut tools = Vec::new();
    for tool in request.tools {
        match tool.builtin {
            Some(BuiltinTool::WebSearch) => tools.push(json!({ "type": "web_search" })),
            None => {
                let parameters = serde_json::from_str::<Value>(&tool.input_schema).map_err(|_| {
                    ProviderError::invalid_request(format!(
                        "tool '{}' schema must be valid JSON",
                        tool.name
                    ))
                })?;
                tools.push(json!({
                    "type": "function",
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": parameters,
                }));
            }
        }
    }

    Ok(ResponsesApiRequest {
        model: request.model,
        instructions: request.instructions,
        input,
        tools: (!tools.is_empty()).then_some(tools),
        temperature: request.options.temperature,
        max_output_tokens: request.options.max_tokens,
        stream,
        store: false,
        extra: request.extra,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponsesApiRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: Vec<ResponsesApiInputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    pub stream: bool,
    pub store: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesApiInputItem {
    Message {
        role: &'static str,
        content: Vec<ResponsesApiContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesApiContentPart {
    InputText { text: String },
    InputImage { image_url: String },
    OutputText { text: String },
}

impl From<ResponseInputItem> for ResponsesApiInputItem {
    fn from(value: ResponseInputItem) -> Self {
        match value {
            ResponseInputItem::Message {
                role,
                content,
                images,
            } => {
                let mut parts = Vec::new();
                if role == Role::Assistant {
                    parts.push(ResponsesApiContentPart::OutputText { text: content });
                } else {
                    if !content.is_empty() {
                        parts.push(ResponsesApiContentPart::InputText { text: content });
                    }
                    parts.extend(images.iter().map(|image| ResponsesApiContentPart::InputImage {
                        image_url: image.data_url(),
                    }));
                }

                Self::Message {
                    role: role.as_str(),
                    content: parts,
                }
            }
            ResponseInputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => Self::FunctionCall {
                call_id,
                name,
                arguments,
            },
            ResponseInputItem::FunctionCallOutput { call_id, output } => {
                Self::FunctionCallOutput { call_id, output }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesApiResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<ResponsesApiOutputItem>,
    #[serde(default)]
    pub usage: Option<ResponsesApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesApiOutputItem {
    Message {
        #[serde(default)]
        content: Vec<ResponsesApiOutputContent>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<ResponsesApiSummary>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesApiOutputContent {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesApiSummary {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ResponsesApiUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl From<ResponsesApiUsage> for OpenAiUsage {
    fn from(value: ResponsesApiUsage) -> Self {
        Self {
            prompt_tokens: value.input_tokens,
            completion_tokens: value.output_tokens,
            total_tokens: value.total_tokens,
        }
    }
}

impl ResponsesApiResponse {
    fn finish_reason(&self) -> OpenAiFinishReason {
        let has_calls = self
            .output
            .iter()
            .any(|item| matches!(item, ResponsesApiOutputItem::FunctionCall { .. }));

        match self.status.as_deref() {
            _ if has_calls => OpenAiFinishReason::ToolCalls,
            Some("incomplete") => OpenAiFinishReason::Length,
            Some("completed") | None => OpenAiFinishReason::Stop,
            Some(_) => OpenAiFinishReason::Other,
        }
    }
}

impl From<ResponsesApiResponse> for OpenAiResponse {
    fn from(value: ResponsesApiResponse) -> Self {
        let finish_reason = value.finish_reason();
        let mut message = OpenAiAssistantMessage::default();
        let mut reasoning = String::new();

        for item in value.output {
            match item {
                ResponsesApiOutputItem::Message { content } => {
                    for part in content {
                        match part {
                            ResponsesApiOutputContent::OutputText { text } => {
                                message.content.push_str(&text)
                            }
                            ResponsesApiOutputContent::Refusal { refusal } => {
                                message.content.push_str(&refusal)
                            }
                            ResponsesApiOutputContent::Other => {}
                        }
                    }
                }
                ResponsesApiOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => message.tool_calls.push(OpenAiToolCall {
                    id: call_id,
                    name,
                    arguments,
                }),
                ResponsesApiOutputItem::Reasoning { summary } => {
                    summary
                        .into_iter()
                        .for_each(|part| reasoning.push_str(&part.text));
                }
                ResponsesApiOutputItem::Other => {}
            }
        }

        message.reasoning = (!reasoning.is_empty()).then_some(reasoning);

        Self {
            model: value.model,
            message,
            finish_reason,
            usage: value.usage.unwrap_or_default().into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum ResponsesApiStreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta { delta: String },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: u32,
        item: ResponsesApiOutputItem,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { output_index: u32, delta: String },
    #[serde(rename = "response.completed", alias = "response.incomplete")]
    Completed { response: ResponsesApiResponse },
    #[serde(rename = "response.failed")]
    Failed { response: Value },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

/// Maps one streaming event to adapter chunks. A `Finished` chunk ends the response.
pub(crate) fn map_stream_event(
    event: ResponsesApiStreamEvent,
) -> Result<Vec<OpenAiStreamChunk>, ProviderError> {
    let chunks = match event {
        ResponsesApiStreamEvent::OutputTextDelta { delta } => {
            vec![OpenAiStreamChunk::TextDelta(delta)]
        }
        ResponsesApiStreamEvent::ReasoningSummaryDelta { delta } => {
            vec![OpenAiStreamChunk::ReasoningDelta(delta)]
        }
        ResponsesApiStreamEvent::OutputItemAdded {
            output_index,
            item:
                ResponsesApiOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                },
        } => vec![OpenAiStreamChunk::ToolCallDelta {
            index: output_index,
            id: Some(call_id),
            name: Some(name),
            arguments: (!arguments.is_empty()).then_some(arguments),
        }],
        ResponsesApiStreamEvent::FunctionCallArgumentsDelta {
            output_index,
            delta,
        } => vec![OpenAiStreamChunk::ToolCallDelta {
            index: output_index,
            id: None,
            name: None,
            arguments: Some(delta),
        }],
        ResponsesApiStreamEvent::Completed { response } => {
            let finish_reason = response.finish_reason();
            let usage = response.usage.unwrap_or_default();
            vec![
                OpenAiStreamChunk::Usage(usage.into()),
                OpenAiStreamChunk::Finished(finish_reason),
            ]
        }
        ResponsesApiStreamEvent::Failed { response } => {
            let message = response
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("response failed");
            return Err(ProviderError::unavailable(message.to_string()));
        }
        ResponsesApiStreamEvent::Error { message } => {
            return Err(ProviderError::transport(message));
        }
        ResponsesApiStreamEvent::OutputItemAdded { .. } | ResponsesApiStreamEvent::Other => {
            Vec::new()
        }
    };

    Ok(chunks)
}
