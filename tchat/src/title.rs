//! Thread title generation after the first exchange.

use std::sync::Arc;

use tcommon::{BoxFuture, ThreadId};
use tprovider::{Message, ModelProvider, ModelRequest};

use crate::ChatError;

const TITLE_PROMPT: &str = "Write a short title (at most six words) for a conversation that \
starts with the exchange below. Reply with the title only, no quotes or punctuation at the end.";

/// Longest title kept, in characters.
pub const MAX_TITLE_CHARS: usize = 60;

pub struct TitleRequest {
    pub thread_id: ThreadId,
    pub provider: Arc<dyn ModelProvider>,
    pub model_id: String,
    pub user_text: String,
    pub reply_text: String,
}

pub trait TitleGenerator: Send + Sync {
    fn generate_title<'a>(&'a self, request: TitleRequest) -> BoxFuture<'a, Result<String, ChatError>>;
}

/// Asks the thread's own model for a title.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderTitleGenerator;

impl TitleGenerator for ProviderTitleGenerator {
    fn generate_title<'a>(&'a self, request: TitleRequest) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(async move {
            let exchange = format!(
                "User: {}\n\nAssistant: {}",
                request.user_text, request.reply_text
            );
            let model_request = ModelRequest::builder(request.model_id)
                .message(Message::system(TITLE_PROMPT))
                .message(Message::user(exchange))
                .max_tokens(32)
                .build()?;

            let response = request.provider.complete(model_request).await?;
            sanitize_title(&response.text())
                .ok_or_else(|| ChatError::provider("model returned an empty title"))
        })
    }
}

/// First non-empty line, unquoted, trimmed and capped at [`MAX_TITLE_CHARS`].
pub fn sanitize_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line
        .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
        .trim_start_matches(|c: char| c == '"' || c == '\'' || c == '*')
        .trim_end_matches(|c: char| matches!(c, '"' | '\'' | '*' | '.'))
        .trim();
    let line = line.strip_prefix("Title:").map(str::trim).unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    Some(line.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string())
}
