//! Wire types for the Anthropic Messages API and their mapping onto the shared model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    BuiltinTool, InlineImage, Message, ModelRequest, ModelResponse, OutputItem, ProviderError,
    ProviderKind, Role, StopReason, StreamEvent, TokenUsage, ToolCall, ToolCallDelta,
};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";
const WEB_SEARCH_MAX_USES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicApiRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicApiMessage {
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    /// Server-side tool traffic such as web search results.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl From<InlineImage> for AnthropicContentBlock {
    fn from(image: InlineImage) -> Self {
        Self::Image {
            source: AnthropicImageSource {
                kind: "base64".to_string(),
                media_type: image.mime_type,
                data: image.data,
            },
        }
    }
}

/// Builds a Messages API body.
///
/// System messages are hoisted into `system`, tool results travel as `tool_result` blocks inside a
/// user turn, and consecutive turns with the same role are merged so roles alternate.
pub(crate) fn build_api_request(
    request: ModelRequest,
    stream: bool,
) -> Result<AnthropicApiRequest, ProviderError> {
    let web_search = request.wants_builtin(BuiltinTool::WebSearch);
    let mut tools = request
        .function_tools()
        .map(|tool| {
            Ok(json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": parse_schema(&tool.input_schema)?,
            }))
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    if web_search {
        tools.push(json!({
            "type": WEB_SEARCH_TOOL_TYPE,
            "name": "web_search",
            "max_uses": WEB_SEARCH_MAX_USES,
        }));
    }

    let mut system = Vec::new();
    let mut messages: Vec<AnthropicApiMessage> = Vec::new();

    for message in request.messages {
        let (role, blocks) = match message.role {
            Role::System => {
                if !message.content.trim().is_empty() {
                    system.push(message.content);
                }
                continue;
            }
            Role::User => ("user", user_blocks(message)),
            Role::Assistant => ("assistant", assistant_blocks(message)),
            Role::Tool => (
                "user",
                vec![AnthropicContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.unwrap_or_default(),
                    content: message.content,
                }],
            ),
        };

        if blocks.is_empty() {
            continue;
        }

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(AnthropicApiMessage {
                role: role.to_string(),
                content: blocks,
            }),
        }
    }

    if messages.first().is_none_or(|first| first.role != "user") {
        return Err(ProviderError::invalid_request(
            "anthropic conversations must start with a user message",
        ));
    }

    Ok(AnthropicApiRequest {
        model: request.model,
        max_tokens: request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
        tools,
        temperature: request.options.temperature,
        stream,
        extra: request.extra,
    })
}

fn user_blocks(message: Message) -> Vec<AnthropicContentBlock> {
    let mut blocks = Vec::with_capacity(message.images.len() + 1);
    if !message.content.is_empty() {
        blocks.push(AnthropicContentBlock::Text {
            text: message.content,
        });
    }
    blocks.extend(message.images.into_iter().map(AnthropicContentBlock::from));
    blocks
}

fn assistant_blocks(message: Message) -> Vec<AnthropicContentBlock> {
    let mut blocks = Vec::with_capacity(message.tool_calls.len() + 1);
    if !message.content.is_empty() {
        blocks.push(AnthropicContentBlock::Text {
            text: message.content,
        });
    }
    for call in message.tool_calls {
        let input = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
        blocks.push(AnthropicContentBlock::ToolUse {
            id: call.id,
            name: call.name,
            input,
        });
    }
    blocks
}

fn parse_schema(schema: &str) -> Result<Value, ProviderError> {
    if schema.trim().is_empty() {
        return Ok(json!({"type": "object", "properties": {}}));
    }
    serde_json::from_str(schema)
        .map_err(|err| ProviderError::invalid_request(format!("invalid tool input schema: {err}")))
}

pub(crate) fn parse_stop_reason(value: Option<&str>) -> StopReason {
    match value {
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        None => StopReason::EndTurn,
        Some(_) => StopReason::Other,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnthropicApiUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnthropicApiResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: AnthropicApiUsage,
}

impl AnthropicApiResponse {
    pub(crate) fn into_model_response(self) -> ModelResponse {
        let mut output = Vec::new();
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                AnthropicContentBlock::Text { text: part } => text.push_str(&part),
                AnthropicContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                    output.push(OutputItem::Reasoning(thinking));
                }
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(OutputItem::ToolCall(ToolCall {
                        id,
                        name,
                        arguments: input.to_string(),
                    }));
                }
                _ => {}
            }
        }

        if !text.is_empty() {
            output.push(OutputItem::Message(Message::assistant(text)));
        }
        output.extend(tool_calls);

        ModelResponse {
            provider: ProviderKind::Anthropic,
            model: self.model,
            output,
            stop_reason: parse_stop_reason(self.stop_reason.as_deref()),
            usage: TokenUsage::new(self.usage.input_tokens, self.usage.output_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicStreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: AnthropicContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: AnthropicDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: AnthropicMessageDelta,
        #[serde(default)]
        usage: Option<AnthropicApiUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnthropicStreamMessage {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: AnthropicApiUsage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnthropicMessageDelta {
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnthropicApiError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

impl From<AnthropicApiError> for ProviderError {
    fn from(value: AnthropicApiError) -> Self {
        match value.kind.as_str() {
            "rate_limit_error" => ProviderError::rate_limited(value.message),
            "overloaded_error" => ProviderError::from_status(529, value.message),
            "api_error" => ProviderError::from_status(500, value.message),
            "authentication_error" | "permission_error" => {
                ProviderError::authentication(value.message)
            }
            "invalid_request_error" | "not_found_error" | "request_too_large" => {
                ProviderError::invalid_request(value.message)
            }
            _ => ProviderError::other(format!("{}: {}", value.kind, value.message)),
        }
    }
}

/// Translates Messages API stream events into shared stream events.
///
/// Content block indices cover text, thinking and tool blocks alike; tool calls are renumbered so
/// downstream accumulation sees a dense `0..n` index space.
#[derive(Debug, Default)]
pub(crate) struct AnthropicStreamState {
    tool_indices: HashMap<u32, u32>,
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<String>,
    finished: bool,
}

impl AnthropicStreamState {
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn map(
        &mut self,
        event: AnthropicStreamEvent,
    ) -> Result<Vec<StreamEvent>, ProviderError> {
        let events = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.input_tokens;
                self.output_tokens = message.usage.output_tokens;
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                AnthropicContentBlock::ToolUse { id, name, .. } => {
                    let tool_index = self.tool_indices.len() as u32;
                    self.tool_indices.insert(index, tool_index);
                    vec![StreamEvent::ToolCallDelta(
                        ToolCallDelta::new(tool_index).with_id(id).with_name(name),
                    )]
                }
                AnthropicContentBlock::Text { text } if !text.is_empty() => {
                    vec![StreamEvent::TextDelta(text)]
                }
                AnthropicContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                    vec![StreamEvent::ReasoningDelta(thinking)]
                }
                _ => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicDelta::TextDelta { text } => vec![StreamEvent::TextDelta(text)],
                AnthropicDelta::ThinkingDelta { thinking } => {
                    vec![StreamEvent::ReasoningDelta(thinking)]
                }
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    let Some(tool_index) = self.tool_indices.get(&index).copied() else {
                        return Err(ProviderError::transport(format!(
                            "input_json_delta for unknown content block {index}"
                        )));
                    };
                    vec![StreamEvent::ToolCallDelta(
                        ToolCallDelta::new(tool_index).with_arguments(partial_json),
                    )]
                }
                AnthropicDelta::Other => Vec::new(),
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if let Some(usage) = usage {
                    self.output_tokens = self.output_tokens.max(usage.output_tokens);
                    if usage.input_tokens > 0 {
                        self.input_tokens = usage.input_tokens;
                    }
                }
                Vec::new()
            }
            AnthropicStreamEvent::MessageStop => {
                self.finished = true;
                vec![
                    StreamEvent::Usage(TokenUsage::new(self.input_tokens, self.output_tokens)),
                    StreamEvent::Finished(parse_stop_reason(self.stop_reason.as_deref())),
                ]
            }
            AnthropicStreamEvent::Error { error } => return Err(error.into()),
            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Unknown => Vec::new(),
        };

        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicApiModelList {
    #[serde(default)]
    pub data: Vec<AnthropicApiModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicApiModel {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}
