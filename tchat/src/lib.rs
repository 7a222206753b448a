//! Conversation orchestration over a branching message tree.
//!
//! [`ConversationService`] turns user intents (send, edit, regenerate, switch branch, stop)
//! into provider calls, tool rounds and stored messages. Each thread has at most one turn in
//! flight; starting another cancels the first.
//!
//! ```rust
//! use tchat::{ChatPolicy, ConversationService, TurnState};
//! use tprovider::ModelKey;
//! use ttree::MessageTreeStore;
//!
//! let service = ConversationService::builder(MessageTreeStore::in_memory())
//!     .policy(ChatPolicy::default().with_default_model(ModelKey::new("openai", "gpt-4o-mini")))
//!     .build();
//!
//! assert_eq!(service.turn_state(&"t-1".into()), TurnState::Idle);
//! assert_eq!(service.in_flight_turns(), 0);
//! ```

mod error;
mod history;
mod hooks;
mod inflight;
mod service;
mod title;
mod tools;
mod types;

pub mod prelude {
    pub use crate::{
        ChatError, ChatErrorKind, ChatErrorPhase, ChatEvent, ChatPolicy, ConversationHooks,
        ConversationService, ConversationServiceBuilder, EditMode, EditOutcome, EditRequest,
        RegenerateMode, SendRequest, StreamSink, TurnOutcome, TurnResult, TurnState,
    };
    pub use tcommon::{MessageId, ThreadId};
    pub use ttooling::{
        DefaultToolRuntime, Tool, ToolError, ToolErrorKind, ToolExecutionContext,
        ToolExecutionResult, ToolRegistry, ToolRuntime,
    };
    pub use ttree::{Attachment, MessageTreeStore, ParentSelector, StoredMessage};
}

pub use error::{ChatError, ChatErrorKind, ChatErrorPhase};
pub use history::{build_history, extract_inline_images};
pub use hooks::{ConversationHooks, NoopConversationHooks};
pub use service::{ChatPolicy, ConversationService, ConversationServiceBuilder};
pub use title::{
    MAX_TITLE_CHARS, ProviderTitleGenerator, TitleGenerator, TitleRequest, sanitize_title,
};
pub use types::{
    ChannelStreamSink, ChatEvent, EditMode, EditOutcome, EditRequest, NoopStreamSink,
    RegenerateMode, SendRequest, StreamSink, TurnOutcome, TurnResult, TurnState,
};
pub use tcommon::{MessageId, ThreadId};
pub use ttooling::{
    DefaultToolRuntime, Tool, ToolError, ToolErrorKind, ToolExecutionContext, ToolExecutionResult,
    ToolRegistry, ToolRuntime,
};
