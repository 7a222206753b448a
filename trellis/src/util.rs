//! Small convenience constructors for common types.

use crate::{Message, ModelKey, ProviderKind, Role, SendRequest};

pub fn system_message(content: impl Into<String>) -> Message {
    Message::new(Role::System, content)
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message::new(Role::User, content)
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message::new(Role::Assistant, content)
}

pub fn tool_message(tool_call_id: impl Into<String>, content: impl Into<String>) -> Message {
    Message::tool_result(tool_call_id, content)
}

/// Starts a new thread on `model` with `text` as its first message.
pub fn first_message(model: ModelKey, text: impl Into<String>) -> SendRequest {
    SendRequest::new(text).with_model(model)
}

/// Accepts `provider/model`, or a bare model id resolved against `default_provider`.
pub fn parse_model_key(value: &str, default_provider: &str) -> Option<ModelKey> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    ModelKey::parse(value).or_else(|| {
        (!value.contains('/') && !default_provider.is_empty())
            .then(|| ModelKey::new(default_provider, value))
    })
}

pub fn parse_provider_kind(value: &str) -> Option<ProviderKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "openai" => Some(ProviderKind::OpenAi),
        "claude" | "anthropic" => Some(ProviderKind::Anthropic),
        "ollama" | "local" => Some(ProviderKind::Ollama),
        "openai-compatible" | "openai_compatible" | "compatible" | "custom" => {
            Some(ProviderKind::OpenAiCompatible)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::{ModelKey, ProviderKind, Role};

    use super::{first_message, parse_model_key, parse_provider_kind, tool_message};

    #[test]
    fn parse_provider_kind_supports_aliases() {
        assert_eq!(parse_provider_kind("openai"), Some(ProviderKind::OpenAi));
        assert_eq!(parse_provider_kind(" Claude "), Some(ProviderKind::Anthropic));
        assert_eq!(parse_provider_kind("local"), Some(ProviderKind::Ollama));
        assert_eq!(
            parse_provider_kind("openai_compatible"),
            Some(ProviderKind::OpenAiCompatible)
        );
        assert_eq!(parse_provider_kind("unknown"), None);
    }

    #[test]
    fn model_keys_fall_back_to_the_default_provider() {
        assert_eq!(
            parse_model_key("openai/gpt-4o", "local"),
            Some(ModelKey::new("openai", "gpt-4o"))
        );
        assert_eq!(
            parse_model_key("llama3", "local"),
            Some(ModelKey::new("local", "llama3"))
        );
        assert_eq!(
            parse_model_key("lab/org/model", ""),
            Some(ModelKey::new("lab", "org/model"))
        );
        assert_eq!(parse_model_key("/broken", "local"), None);
        assert_eq!(parse_model_key("  ", "local"), None);
    }

    #[test]
    fn message_helpers_apply_expected_roles() {
        let message = tool_message("call-1", "12:00");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call-1"));

        let request = first_message(ModelKey::new("openai", "gpt-4o"), "hello");
        assert!(request.thread_id.is_none());
        assert_eq!(request.model, Some(ModelKey::new("openai", "gpt-4o")));
    }
}
