//! Thread and message records persisted by the tree store.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tcommon::{MessageId, ThreadId};
use tprovider::{InlineImage, Message, ModelKey, Role, ToolCall};
use ttooling::UiResource;

/// Where a thread's active path ends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LeafPointer {
    /// Never set; resolves to the most recently created message.
    #[default]
    Latest,
    /// Explicitly empty; the active path has no messages.
    Root,
    Message(MessageId),
}

impl LeafPointer {
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Message(id) => Some(id),
            _ => None,
        }
    }
}

impl From<MessageId> for LeafPointer {
    fn from(value: MessageId) -> Self {
        Self::Message(value)
    }
}

/// Parent choice for a new message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParentSelector {
    /// Attach below the thread's current active leaf.
    #[default]
    CurrentLeaf,
    /// Start a new root branch.
    Root,
    Message(MessageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    #[default]
    User,
    Model,
    /// Written by the engine itself, e.g. a persisted provider failure.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl From<tprovider::TokenUsage> for UsageMetrics {
    fn from(value: tprovider::TokenUsage) -> Self {
        Self {
            input_tokens: value.input_tokens,
            output_tokens: value.output_tokens,
            total_tokens: value.total_tokens,
            cost: None,
        }
    }
}

/// A file attached to a user message. Data is base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate().into_inner(),
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn to_inline_image(&self) -> Option<InlineImage> {
        self.is_image()
            .then(|| InlineImage::new(self.mime_type.clone(), self.data.clone()))
    }
}

/// Per-thread generation settings captured when the thread is created.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Maximum number of history messages sent with a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ThreadSettings {
    pub fn for_model(model: ModelKey) -> Self {
        Self {
            model: Some(model),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_context_window(mut self, messages: usize) -> Self {
        self.context_window = Some(messages);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    #[serde(default)]
    pub active_leaf: LeafPointer,
    #[serde(default)]
    pub settings: ThreadSettings,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Thread {
    pub fn new(title: impl Into<String>, settings: ThreadSettings) -> Self {
        let now = SystemTime::now();
        Self {
            id: ThreadId::generate(),
            title: title.into(),
            active_leaf: LeafPointer::Latest,
            settings,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub parent_id: Option<MessageId>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Images produced by the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<InlineImage>,
    #[serde(default)]
    pub origin: MessageOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_resource: Option<UiResource>,
    pub created_at: SystemTime,
    /// Total creation order across the store. Assigned on insert.
    #[serde(default)]
    pub sequence: u64,
}

impl StoredMessage {
    /// Engine-written error notes are kept in the tree but never sent back to a model.
    pub fn is_error_note(&self) -> bool {
        self.origin == MessageOrigin::System
    }

    /// Provider view of this message, without attachments.
    pub fn to_message(&self) -> Message {
        let mut message = Message::new(self.role, self.content.clone());
        message.tool_calls = self.tool_calls.clone();
        message.tool_call_id = self.tool_call_id.clone();
        message.reasoning = self.reasoning.clone();
        message
    }
}

/// A message to append. The store resolves the parent and assigns id, time and sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub thread_id: ThreadId,
    pub parent: ParentSelector,
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
    pub reasoning: Option<String>,
    pub usage: Option<UsageMetrics>,
    pub model: Option<String>,
    pub attachments: Vec<Attachment>,
    pub images: Vec<InlineImage>,
    pub origin: MessageOrigin,
    pub ui_resource: Option<UiResource>,
    /// Make the new message the thread's active leaf.
    pub advance_leaf: bool,
}

impl NewMessage {
    pub fn new(
        thread_id: impl Into<ThreadId>,
        role: Role,
        content: impl Into<String>,
        origin: MessageOrigin,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            parent: ParentSelector::CurrentLeaf,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning: None,
            usage: None,
            model: None,
            attachments: Vec::new(),
            images: Vec::new(),
            origin,
            ui_resource: None,
            advance_leaf: true,
        }
    }

    pub fn user(thread_id: impl Into<ThreadId>, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::User, content, MessageOrigin::User)
    }

    pub fn assistant(thread_id: impl Into<ThreadId>, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::Assistant, content, MessageOrigin::Model)
    }

    pub fn tool_result(
        thread_id: impl Into<ThreadId>,
        tool_call_id: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(thread_id, Role::Tool, output, MessageOrigin::Model);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Assistant-role note authored by the engine, e.g. a provider failure.
    pub fn error_note(thread_id: impl Into<ThreadId>, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::Assistant, content, MessageOrigin::System)
    }

    pub fn with_parent(mut self, parent: ParentSelector) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_usage(mut self, usage: Option<UsageMetrics>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_images(mut self, images: Vec<InlineImage>) -> Self {
        self.images = images;
        self
    }

    pub fn with_ui_resource(mut self, ui_resource: Option<UiResource>) -> Self {
        self.ui_resource = ui_resource;
        self
    }

    pub fn without_leaf_update(mut self) -> Self {
        self.advance_leaf = false;
        self
    }

    pub(crate) fn into_stored(
        self,
        parent_id: Option<MessageId>,
        created_at: SystemTime,
    ) -> StoredMessage {
        StoredMessage {
            id: MessageId::generate(),
            thread_id: self.thread_id,
            parent_id,
            role: self.role,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: self.tool_call_id,
            reasoning: self.reasoning,
            usage: self.usage,
            model: self.model,
            attachments: self.attachments,
            images: self.images,
            origin: self.origin,
            ui_resource: self.ui_resource,
            created_at,
            sequence: 0,
        }
    }
}

/// Position of a message among its siblings. `current` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub current: usize,
    pub total: usize,
    pub siblings: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<MessageId>,
    /// New active leaf when the old one was removed.
    pub reassigned_leaf: Option<LeafPointer>,
}

pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Snapshot of every thread and message in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeBackup {
    pub version: u32,
    pub exported_at: SystemTime,
    pub threads: Vec<Thread>,
    pub messages: Vec<StoredMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_pointer_serializes_tagged() {
        let json = serde_json::to_value(LeafPointer::Message(MessageId::new("m-1")))
            .expect("serialize");
        assert_eq!(json, serde_json::json!({"kind": "message", "id": "m-1"}));

        let root: LeafPointer =
            serde_json::from_value(serde_json::json!({"kind": "root"})).expect("deserialize");
        assert_eq!(root, LeafPointer::Root);
    }

    #[test]
    fn attachments_only_inline_images() {
        let image = Attachment::new("cat.png", "image/png", "iVBOR");
        let text = Attachment::new("notes.txt", "text/plain", "aGk=");

        assert_eq!(
            image.to_inline_image().map(|image| image.data_url()),
            Some("data:image/png;base64,iVBOR".to_string())
        );
        assert!(text.to_inline_image().is_none());
    }

    #[test]
    fn error_notes_are_assistant_role_with_system_origin() {
        let note = NewMessage::error_note("t-1", "Error: provider unavailable")
            .into_stored(None, SystemTime::now());
        assert_eq!(note.role, Role::Assistant);
        assert!(note.is_error_note());
        assert_eq!(note.to_message().content, "Error: provider unavailable");
    }
}
