//! Provider-agnostic request, response, and message model types.
//!
//! ```rust
//! use tprovider::{Message, ModelRequest, ProviderErrorKind};
//!
//! let ok = ModelRequest::new_validated("gpt-4o-mini", vec![Message::user("Summarize this")]);
//! assert!(ok.is_ok());
//!
//! let err = ModelRequest::new_validated("", vec![Message::user("hi")])
//!     .err()
//!     .expect("empty model should fail");
//! assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
//! ```

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tcommon::{GenerationOptions, MetadataMap};

use crate::ProviderError;

/// Wire family spoken by a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
}

impl ProviderKind {
    /// Whether the provider exposes a native web search tool.
    pub fn supports_native_web_search(self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic)
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let id = match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::OpenAiCompatible => "openai-compatible",
        };

        f.write_str(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Base64 image payload sent to or received from a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Parses `data:<mime>;base64,<payload>`.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.trim().strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        if mime_type.is_empty() || data.is_empty() {
            return None;
        }

        Some(Self::new(mime_type, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub images: Vec<InlineImage>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
    pub reasoning: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, output);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_images(mut self, images: Vec<InlineImage>) -> Self {
        self.images = images;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Provider-native tools executed on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    WebSearch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: String,
    pub builtin: Option<BuiltinTool>,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: input_schema.into(),
            builtin: None,
        }
    }

    pub fn builtin(tool: BuiltinTool) -> Self {
        let (name, description) = match tool {
            BuiltinTool::WebSearch => ("web_search", "Search the web for current information"),
        };

        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: "{\"type\":\"object\"}".to_string(),
            builtin: Some(tool),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    Message(Message),
    ToolCall(ToolCall),
    Reasoning(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Cancelled,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub provider: ProviderKind,
    pub model: String,
    pub output: Vec<OutputItem>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Concatenated assistant text across all message items.
    pub fn text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message(message) => Some(message.content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn reasoning(&self) -> Option<String> {
        let parts = self
            .output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Reasoning(text) => Some(text.as_str()),
                OutputItem::Message(message) => message.reasoning.as_deref(),
                _ => None,
            })
            .collect::<Vec<_>>();

        (!parts.is_empty()).then(|| parts.join(""))
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn images(&self) -> Vec<InlineImage> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message(message) => Some(message.images.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Turn-based request shape shared by all adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
    pub tools: Vec<ToolDefinition>,
    /// Provider-specific body parameters merged into the outgoing payload.
    pub extra: Map<String, Value>,
    pub metadata: MetadataMap,
}

impl ModelRequest {
    pub fn builder(model: impl Into<String>) -> ModelRequestBuilder {
        ModelRequestBuilder::new(model)
    }

    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: GenerationOptions::default(),
            tools: Vec::new(),
            extra: Map::new(),
            metadata: MetadataMap::new(),
        }
    }

    pub fn new_validated(
        model: impl Into<String>,
        messages: Vec<Message>,
    ) -> Result<Self, ProviderError> {
        let request = Self::new(model, messages);
        request.validate()?;
        Ok(request)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn enable_streaming(mut self) -> Self {
        self.options.stream = true;
        self
    }

    pub fn function_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(|tool| !tool.is_builtin())
    }

    pub fn wants_builtin(&self, tool: BuiltinTool) -> bool {
        self.tools.iter().any(|item| item.builtin == Some(tool))
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.model.trim().is_empty() {
            return Err(ProviderError::invalid_request("model must not be empty"));
        }

        if self.messages.is_empty() {
            return Err(ProviderError::invalid_request(
                "at least one message is required",
            ));
        }

        if let Some(max_tokens) = self.options.max_tokens
            && max_tokens == 0
        {
            return Err(ProviderError::invalid_request(
                "max_tokens must be greater than zero",
            ));
        }

        if let Some(temperature) = self.options.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ProviderError::invalid_request(
                "temperature must be in the inclusive range 0.0..=2.0",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequestBuilder {
    request: ModelRequest,
}

impl ModelRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request: ModelRequest::new(model, Vec::new()),
        }
    }

    pub fn message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.request.messages.extend(messages);
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.request.options = options;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.request.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.request.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.request.tools = tools;
        self
    }

    pub fn extra(mut self, extra: Map<String, Value>) -> Self {
        self.request.extra.extend(extra);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.metadata.insert(key.into(), value.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.request.options.stream = stream;
        self
    }

    pub fn enable_streaming(self) -> Self {
        self.streaming(true)
    }

    pub fn build(self) -> Result<ModelRequest, ProviderError> {
        self.request.validate()?;
        Ok(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderErrorKind;

    #[test]
    fn provider_kind_display_and_serde_agree() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Ollama,
            ProviderKind::OpenAiCompatible,
        ] {
            let json = serde_json::to_string(&kind).expect("kind should serialize");
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn inline_images_round_trip_data_urls() {
        let image = InlineImage::from_data_url("data:image/png;base64,iVBOR")
            .expect("data url should parse");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data_url(), "data:image/png;base64,iVBOR");
        assert!(InlineImage::from_data_url("https://example.com/a.png").is_none());
        assert!(InlineImage::from_data_url("data:image/png,raw").is_none());
    }

    #[test]
    fn validate_enforces_request_contract() {
        let err = ModelRequest::new("  ", vec![Message::user("hi")])
            .validate()
            .expect_err("blank model must fail");
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);

        assert!(ModelRequest::new("m", Vec::new()).validate().is_err());
        assert!(
            ModelRequest::new("m", vec![Message::user("hi")])
                .with_temperature(3.0)
                .validate()
                .is_err()
        );
        assert!(
            ModelRequest::new("m", vec![Message::user("hi")])
                .with_max_tokens(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn builder_collects_tools_and_extra_parameters() {
        let mut extra = Map::new();
        extra.insert("top_p".to_string(), Value::from(0.9));

        let request = ModelRequest::builder("gpt-4o")
            .message(Message::system("be brief"))
            .message(Message::user("hi"))
            .tools(vec![
                ToolDefinition::function("lookup", "Look up", "{}"),
                ToolDefinition::builtin(BuiltinTool::WebSearch),
            ])
            .extra(extra)
            .enable_streaming()
            .build()
            .expect("request should build");

        assert_eq!(request.function_tools().count(), 1);
        assert!(request.wants_builtin(BuiltinTool::WebSearch));
        assert_eq!(request.extra.get("top_p"), Some(&Value::from(0.9)));
        assert!(request.options.stream);
    }

    #[test]
    fn response_helpers_split_output_items() {
        let response = ModelResponse {
            provider: ProviderKind::OpenAi,
            model: "m".to_string(),
            output: vec![
                OutputItem::Reasoning("thinking".to_string()),
                OutputItem::Message(Message::assistant("hello ")),
                OutputItem::Message(Message::assistant("world")),
                OutputItem::ToolCall(ToolCall {
                    id: "c1".to_string(),
                    name: "foo".to_string(),
                    arguments: "{}".to_string(),
                }),
            ],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::new(3, 4),
        };

        assert_eq!(response.text(), "hello world");
        assert_eq!(response.reasoning().as_deref(), Some("thinking"));
        assert_eq!(response.tool_calls().len(), 1);
        assert_eq!(response.usage.total_tokens, 7);
    }
}
