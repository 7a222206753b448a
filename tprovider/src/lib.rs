//! Provider abstraction for the trellis conversation engine.
//!
//! Every backend speaks one request/response shape ([`ModelRequest`], [`ModelResponse`],
//! [`StreamEvent`]); wire formats stay inside `adapters`. The crate also owns the model catalog,
//! credential storage and the retry controller wrapped around provider calls.

pub mod adapters;
mod catalog;
mod credentials;
mod error;
mod model;
pub mod prelude;
mod provider;
mod registry;
mod resilience;
mod response;
mod stream;

pub use catalog::{
    AvailableModel, ManualModel, ModelCapabilities, ModelCatalog, ModelConfig, ModelKey,
    ModelOverride, ModelSource, ProtocolKind, ProviderConfig, ResolvedModel, fetch_model_catalog,
    merge_model_catalog,
};
pub use credentials::{SecretString, SecureCredentialManager};
pub use error::{ProviderError, ProviderErrorKind, extract_status};
pub use model::{
    BuiltinTool, InlineImage, Message, ModelRequest, ModelRequestBuilder, ModelResponse,
    OutputItem, ProviderKind, Role, StopReason, TokenUsage, ToolCall, ToolDefinition,
};
pub use provider::{ModelProvider, ProviderFuture};
pub use registry::ProviderRegistry;
pub use resilience::{
    NoopOperationHooks, ProviderOperationHooks, RetryClass, RetryPolicies, RetryPolicy,
    cancellable, execute_with_retry, with_retry,
};
pub use response::{ResponseInputItem, ResponseRequest};
pub use stream::{
    BoxedEventStream, ModelEventStream, StreamAccumulator, StreamEvent, ToolCallDelta,
    VecEventStream,
};
pub use tcommon::{GenerationOptions, MetadataMap};
