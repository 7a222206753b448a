//! Turns an active path into provider messages, and provider text back into stored content.

use std::sync::LazyLock;

use regex::Regex;
use tprovider::{InlineImage, Message, Role};
use ttree::StoredMessage;

static MARKDOWN_DATA_IMAGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\((data:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/=\s]+)\)").ok()
});

/// Provider history for a path.
///
/// Error notes are left out. With a `context_window` only the newest messages are kept, and the
/// kept window opens on a user message. When the window holds no user message it reaches back
/// to the latest one before it, so a long tool loop keeps its request. Image attachments are
/// inlined only when `embed_images` is set.
pub fn build_history(
    path: &[StoredMessage],
    system_prompt: Option<&str>,
    context_window: Option<usize>,
    embed_images: bool,
) -> Vec<Message> {
    let mut history = path
        .iter()
        .filter(|message| !message.is_error_note())
        .map(|message| {
            let mut converted = message.to_message();
            if embed_images {
                converted.images = message
                    .attachments
                    .iter()
                    .filter_map(|attachment| attachment.to_inline_image())
                    .collect();
            }
            converted
        })
        .collect::<Vec<_>>();

    if let Some(window) = context_window
        && history.len() > window
    {
        let cut = history.len() - window;
        let start = history[cut..]
            .iter()
            .position(|message| message.role == Role::User)
            .map(|offset| cut + offset)
            .or_else(|| history[..cut].iter().rposition(|message| message.role == Role::User))
            .unwrap_or_else(|| {
                cut + history[cut..]
                    .iter()
                    .take_while(|message| message.role == Role::Tool)
                    .count()
            });
        history.drain(..start);
    }

    if let Some(prompt) = system_prompt.filter(|prompt| !prompt.trim().is_empty()) {
        history.insert(0, Message::system(prompt));
    }

    history
}

/// Pulls `![alt](data:image/...)` images out of model text.
///
/// Returns the text with those images removed plus the decoded images in order of appearance.
pub fn extract_inline_images(text: &str) -> (String, Vec<InlineImage>) {
    let Some(pattern) = MARKDOWN_DATA_IMAGE.as_ref() else {
        return (text.to_string(), Vec::new());
    };

    let mut images = Vec::new();
    let stripped = pattern.replace_all(text, |captures: &regex::Captures<'_>| {
        match InlineImage::from_data_url(&captures[1]) {
            Some(image) => {
                images.push(image);
                String::new()
            }
            None => captures[0].to_string(),
        }
    });

    if images.is_empty() {
        return (text.to_string(), images);
    }
    (stripped.trim().to_string(), images)
}
