//! Common `tprovider` imports for downstream crates.

pub use crate::{
    BoxedEventStream, BuiltinTool, InlineImage, Message, ModelCatalog, ModelEventStream,
    ModelKey, ModelProvider, ModelRequest, ModelRequestBuilder, ModelResponse, NoopOperationHooks,
    OutputItem, ProviderError, ProviderErrorKind, ProviderKind, ProviderOperationHooks,
    ProviderRegistry, RetryPolicies, RetryPolicy, Role, StopReason, StreamAccumulator,
    StreamEvent, TokenUsage, ToolCall, ToolDefinition, execute_with_retry,
};
pub use tcommon::{BoxFuture, GenerationOptions, MetadataMap};
