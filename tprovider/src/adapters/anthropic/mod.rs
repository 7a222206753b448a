mod provider;
mod serde_api;
mod transport;

pub use provider::AnthropicProvider;
pub use serde_api::{
    ANTHROPIC_VERSION, AnthropicApiError, AnthropicApiMessage, AnthropicApiRequest,
    AnthropicApiResponse, AnthropicApiUsage, AnthropicContentBlock, AnthropicDelta,
    AnthropicImageSource, AnthropicMessageDelta, AnthropicStreamEvent, AnthropicStreamMessage,
    DEFAULT_MAX_TOKENS,
};
pub use transport::{
    ANTHROPIC_BASE_URL, AnthropicEventStream, AnthropicHttpTransport, AnthropicTransport,
};
