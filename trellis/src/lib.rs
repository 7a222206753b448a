//! Unified facade over the Trellis workspace crates.
//!
//! Most applications depend on this crate alone. It re-exports the tree store, provider,
//! tooling, conversation and observability crates, builds providers from catalog records
//! and assembles a ready [`ConversationService`] through [`build_runtime`].
//!
//! ```rust
//! use trellis::{ModelCatalog, ModelConfig, ProviderConfig, ProviderKind, RuntimeConfig, build_runtime};
//!
//! let catalog = ModelCatalog::new()
//!     .with_provider(ProviderConfig::new("local", ProviderKind::Ollama))
//!     .with_model(ModelConfig::new("local", "llama3"));
//!
//! let runtime = build_runtime(RuntimeConfig::in_memory().with_catalog(catalog))
//!     .expect("runtime builds");
//! assert!(runtime.providers.contains("local"));
//! ```

mod macros;

pub mod prelude;
pub mod providers;
pub mod runtime;
pub mod util;

pub use tchat;
pub use tcommon;
pub use tobserve;
pub use tprovider;
pub use ttooling;
pub use ttree;

pub use tchat::{
    ChannelStreamSink, ChatError, ChatErrorKind, ChatErrorPhase, ChatEvent, ChatPolicy,
    ConversationHooks, ConversationService, ConversationServiceBuilder, EditMode, EditOutcome,
    EditRequest, NoopConversationHooks, NoopStreamSink, ProviderTitleGenerator, RegenerateMode,
    SendRequest, StreamSink, TitleGenerator, TitleRequest, TurnOutcome, TurnResult, TurnState,
};
pub use tcommon::{BoxFuture, GenerationOptions, MessageId, MetadataMap, ThreadId};
pub use tobserve::{
    MetricsObservabilityHooks, SafeConversationHooks, SafeProviderHooks, SafeToolHooks,
    TracingObservabilityHooks,
};
pub use tprovider::{
    BoxedEventStream, InlineImage, Message, ModelCapabilities, ModelCatalog, ModelConfig,
    ModelEventStream, ModelKey, ModelProvider, ModelRequest, ModelResponse, NoopOperationHooks,
    OutputItem, ProtocolKind, ProviderConfig, ProviderError, ProviderErrorKind, ProviderFuture,
    ProviderKind, ProviderOperationHooks, ProviderRegistry, RetryPolicies, RetryPolicy, Role,
    SecretString, SecureCredentialManager, StopReason, StreamEvent, TokenUsage, ToolCall,
    ToolDefinition, VecEventStream,
};
pub use ttooling::{
    DefaultToolRuntime, FunctionTool, HttpServerConnector, NoopToolRuntimeHooks,
    RemoteToolManager, RemoteToolServerConfig, Tool, ToolError, ToolErrorKind,
    ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolGateway, ToolRegistry, ToolRuntime,
    ToolRuntimeHooks, UiResource, parse_json_object, parse_json_value, required_string,
};
pub use ttree::{
    Attachment, BranchInfo, MessageOrigin, MessageTreeStore, ParentSelector, StoreError,
    StoreErrorKind, StoredMessage, Thread, ThreadSettings, TreeBackendConfig, create_tree_backend,
};

pub use providers::{ProviderBuildConfig, build_provider, build_registry};
pub use runtime::{
    ObservabilityMode, RuntimeBundle, RuntimeConfig, build_runtime, build_runtime_with_tools,
    in_memory_service,
};
pub use util::{
    assistant_message, first_message, parse_model_key, parse_provider_kind, system_message,
    tool_message, user_message,
};
