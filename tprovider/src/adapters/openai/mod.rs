mod auth;
mod provider;
mod responses_api;
mod serde_api;
mod transport;
mod types;

pub use provider::OpenAiProvider;
pub use transport::{OPENAI_BASE_URL, OpenAiChunkStream, OpenAiHttpTransport, OpenAiTransport};
pub use types::{
    OpenAiAssistantMessage, OpenAiAuth, OpenAiFinishReason, OpenAiMessage, OpenAiRequest,
    OpenAiResponse, OpenAiRole, OpenAiStreamChunk, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
