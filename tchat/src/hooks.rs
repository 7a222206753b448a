//! Turn lifecycle hooks.
//!
//! ```rust
//! use tchat::{ConversationHooks, NoopConversationHooks};
//!
//! fn assert_hooks_trait(_hooks: &dyn ConversationHooks) {}
//!
//! assert_hooks_trait(&NoopConversationHooks);
//! ```

use std::time::Duration;

use tcommon::ThreadId;
use ttree::StoredMessage;

use crate::{ChatError, TurnState};

pub trait ConversationHooks: Send + Sync {
    fn on_turn_state(&self, _thread_id: &ThreadId, _state: TurnState) {}

    fn on_tool_round(&self, _thread_id: &ThreadId, _round: u32, _calls: usize) {}

    fn on_turn_completed(&self, _thread_id: &ThreadId, _reply: &StoredMessage, _elapsed: Duration) {}

    /// The turn ended in a stored error note.
    fn on_turn_failed(&self, _thread_id: &ThreadId, _error: &ChatError, _elapsed: Duration) {}

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, _elapsed: Duration) {}

    fn on_title_generated(&self, _thread_id: &ThreadId, _title: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConversationHooks;

impl ConversationHooks for NoopConversationHooks {}
