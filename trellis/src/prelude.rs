//! Common imports for most Trellis applications.

pub use crate::{
    ObservabilityMode, ProviderBuildConfig, RuntimeBundle, RuntimeConfig, assistant_message,
    build_provider, build_registry, build_runtime, build_runtime_with_tools, first_message,
    in_memory_service, parse_model_key, parse_provider_kind, system_message, tool_message,
    user_message,
};
pub use crate::{model_key, trellis_messages, trellis_msg};
pub use crate::{
    Attachment, BranchInfo, ChatError, ChatErrorKind, ChatEvent, ChatPolicy, ConversationService,
    EditMode, EditRequest, Message, MessageId, MessageTreeStore, ModelCatalog, ModelConfig,
    ModelKey, ModelProvider, ParentSelector, ProviderConfig, ProviderError, ProviderKind,
    RegenerateMode, Role, SendRequest, StoredMessage, Thread, ThreadId, ToolCall, ToolDefinition,
    ToolError, ToolExecutionContext, ToolExecutionResult, ToolRegistry, ToolRuntime, TurnOutcome,
    TurnResult, TurnState,
};
