//! Turn requests, results, states and the live stream sink.

use std::fmt::{Display, Formatter};

use tcommon::{MessageId, ThreadId};
use tokio::sync::mpsc::UnboundedSender;
use tprovider::ModelKey;
use ttree::{Attachment, ParentSelector, StoredMessage};

use crate::ChatError;

/// A user intent to add a message and get a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    /// `None` starts a new thread.
    pub thread_id: Option<ThreadId>,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub parent: ParentSelector,
    /// Model for a new thread. Existing threads keep the model in their settings.
    pub model: Option<ModelKey>,
}

impl SendRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            thread_id: None,
            text: text.into(),
            attachments: Vec::new(),
            parent: ParentSelector::CurrentLeaf,
            model: None,
        }
    }

    pub fn in_thread(mut self, thread_id: impl Into<ThreadId>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_parent(mut self, parent: ParentSelector) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_model(mut self, model: ModelKey) -> Self {
        self.model = Some(model);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    /// Rewrite in place and keep the subtree below.
    #[default]
    Save,
    /// Rewrite in place, drop the subtree below and ask again.
    Regenerate,
    /// Leave the original alone and send the edited text as a new sibling.
    Branch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub message_id: MessageId,
    pub content: String,
    pub mode: EditMode,
    pub removed_attachment_ids: Vec<String>,
    pub new_attachments: Vec<Attachment>,
}

impl EditRequest {
    pub fn new(message_id: impl Into<MessageId>, content: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            content: content.into(),
            mode: EditMode::Save,
            removed_attachment_ids: Vec::new(),
            new_attachments: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: EditMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn remove_attachment(mut self, attachment_id: impl Into<String>) -> Self {
        self.removed_attachment_ids.push(attachment_id.into());
        self
    }

    pub fn add_attachment(mut self, attachment: Attachment) -> Self {
        self.new_attachments.push(attachment);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegenerateMode {
    /// Delete the regenerated reply and its descendants first.
    #[default]
    Replace,
    /// Keep the old reply as a sibling branch.
    Branch,
}

/// Per-thread turn progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TurnState {
    #[default]
    Idle,
    UserMessagePersisted,
    AwaitingProviderReply,
    StreamingReply,
    ToolCallsPending,
}

impl TurnState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::UserMessagePersisted => "user_message_persisted",
            Self::AwaitingProviderReply => "awaiting_provider_reply",
            Self::StreamingReply => "streaming_reply",
            Self::ToolCallsPending => "tool_calls_pending",
        }
    }
}

impl Display for TurnState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model produced a final reply.
    Completed,
    /// The turn ended in a stored error note.
    Failed(ChatError),
    /// Stopped by the user or superseded by a newer send. Nothing further was stored.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub thread_id: ThreadId,
    pub created_thread: bool,
    /// Every message stored by this turn, in creation order.
    pub persisted: Vec<StoredMessage>,
    pub outcome: TurnOutcome,
}

impl TurnResult {
    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == TurnOutcome::Cancelled
    }

    /// Last stored message unless the turn was cancelled.
    pub fn final_message(&self) -> Option<&StoredMessage> {
        match self.outcome {
            TurnOutcome::Cancelled => None,
            _ => self.persisted.last(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// The edited message, or the new sibling in [`EditMode::Branch`].
    pub message: StoredMessage,
    pub turn: Option<TurnResult>,
}

/// Live turn output for display. Persisted messages are the source of truth.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta { thread_id: ThreadId, delta: String },
    ReasoningDelta { thread_id: ThreadId, delta: String },
    /// A retry restarted the reply; previously streamed text is void.
    StreamReset { thread_id: ThreadId },
    MessagePersisted(StoredMessage),
    ActivePathChanged { thread_id: ThreadId },
}

pub trait StreamSink: Send + Sync {
    fn on_text_delta(&self, _thread_id: &ThreadId, _delta: &str) {}

    fn on_reasoning_delta(&self, _thread_id: &ThreadId, _delta: &str) {}

    fn on_stream_reset(&self, _thread_id: &ThreadId) {}

    fn on_message_persisted(&self, _message: &StoredMessage) {}

    fn on_active_path_changed(&self, _thread_id: &ThreadId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStreamSink;

impl StreamSink for NoopStreamSink {}

/// Forwards every sink callback as a [`ChatEvent`] on an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelStreamSink {
    sender: UnboundedSender<ChatEvent>,
}

impl ChannelStreamSink {
    pub fn new(sender: UnboundedSender<ChatEvent>) -> Self {
        Self { sender }
    }

    fn emit(&self, event: ChatEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.sender.send(event);
    }
}

impl StreamSink for ChannelStreamSink {
    fn on_text_delta(&self, thread_id: &ThreadId, delta: &str) {
        self.emit(ChatEvent::TextDelta {
            thread_id: thread_id.clone(),
            delta: delta.to_string(),
        });
    }

    fn on_reasoning_delta(&self, thread_id: &ThreadId, delta: &str) {
        self.emit(ChatEvent::ReasoningDelta {
            thread_id: thread_id.clone(),
            delta: delta.to_string(),
        });
    }

    fn on_stream_reset(&self, thread_id: &ThreadId) {
        self.emit(ChatEvent::StreamReset {
            thread_id: thread_id.clone(),
        });
    }

    fn on_message_persisted(&self, message: &StoredMessage) {
        self.emit(ChatEvent::MessagePersisted(message.clone()));
    }

    fn on_active_path_changed(&self, thread_id: &ThreadId) {
        self.emit(ChatEvent::ActivePathChanged {
            thread_id: thread_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    #[test]
    fn channel_sink_forwards_deltas_in_order() {
        let (sender, mut receiver) = unbounded_channel();
        let sink = ChannelStreamSink::new(sender);
        let thread_id = ThreadId::new("t-1");

        sink.on_text_delta(&thread_id, "he");
        sink.on_text_delta(&thread_id, "llo");
        sink.on_stream_reset(&thread_id);

        assert_eq!(
            receiver.try_recv().expect("first"),
            ChatEvent::TextDelta {
                thread_id: thread_id.clone(),
                delta: "he".to_string()
            }
        );
        assert!(matches!(
            receiver.try_recv().expect("second"),
            ChatEvent::TextDelta { delta, .. } if delta == "llo"
        ));
        assert!(matches!(
            receiver.try_recv().expect("third"),
            ChatEvent::StreamReset { .. }
        ));
    }

    #[test]
    fn cancelled_turns_have_no_final_message() {
        let result = TurnResult {
            thread_id: ThreadId::new("t-1"),
            created_thread: false,
            persisted: Vec::new(),
            outcome: TurnOutcome::Cancelled,
        };
        assert!(result.is_cancelled());
        assert!(result.final_message().is_none());
        assert_eq!(TurnState::ToolCallsPending.to_string(), "tool_calls_pending");
    }
}
