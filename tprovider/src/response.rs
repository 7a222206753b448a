//! Item-based request shape for providers with a structured response protocol.
//!
//! A turn-based [`ModelRequest`] converts losslessly into a [`ResponseRequest`]: system
//! messages become instructions, assistant tool calls become `FunctionCall` items and tool
//! results become `FunctionCallOutput` items.
//!
//! ```rust
//! use tprovider::{Message, ModelRequest, ResponseInputItem, ResponseRequest, ToolCall};
//!
//! let call = ToolCall { id: "c1".into(), name: "lookup".into(), arguments: "{}".into() };
//! let request = ModelRequest::new("gpt-4.1", vec![
//!     Message::system("be brief"),
//!     Message::user("hi"),
//!     Message::assistant("").with_tool_calls(vec![call]),
//!     Message::tool_result("c1", "42"),
//! ]);
//!
//! let items = ResponseRequest::from(request);
//! assert_eq!(items.instructions.as_deref(), Some("be brief"));
//! assert_eq!(items.input.len(), 3);
//! assert!(matches!(items.input[2], ResponseInputItem::FunctionCallOutput { .. }));
//! ```

use serde_json::{Map, Value};
use tcommon::{GenerationOptions, MetadataMap};

use crate::{InlineImage, ModelRequest, ProviderError, Role, ToolDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseInputItem {
    Message {
        role: Role,
        content: String,
        images: Vec<InlineImage>,
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

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRequest {
    pub model: String,
    pub instructions: Option<String>,
    pub input: Vec<ResponseInputItem>,
    pub tools: Vec<ToolDefinition>,
    pub options: GenerationOptions,
    pub extra: Map<String, Value>,
    pub metadata: MetadataMap,
}

impl ResponseRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.model.trim().is_empty() {
            return Err(ProviderError::invalid_request("model must not be empty"));
        }

        if self.input.is_empty() {
            return Err(ProviderError::invalid_request(
                "at least one input item is required",
            ));
        }

        Ok(())
    }
}

impl From<ModelRequest> for ResponseRequest {
    fn from(request: ModelRequest) -> Self {
        let mut instructions = Vec::new();
        let mut input = Vec::new();

        for message in request.messages {
            match message.role {
                Role::System => instructions.push(message.content),
                Role::Tool => input.push(ResponseInputItem::FunctionCallOutput {
                    call_id: message.tool_call_id.unwrap_or_default(),
                    output: message.content,
                }),
                Role::User | Role::Assistant => {
                    if !message.content.is_empty() || !message.images.is_empty() {
                        input.push(ResponseInputItem::Message {
                            role: message.role,
                            content: message.content,
                            images: message.images,
                        });
                    }

                    input.extend(message.tool_calls.into_iter().map(|call| {
                        ResponseInputItem::FunctionCall {
                            call_id: call.id,
                            name: call.name,
                            arguments: call.arguments,
                        }
                    }));
                }
            }
        }

        Self {
            model: request.model,
            instructions: (!instructions.is_empty()).then(|| instructions.join("\n\n")),
            input,
            tools: request.tools,
            options: request.options,
            extra: request.extra,
            metadata: request.metadata,
        }
    }
}
