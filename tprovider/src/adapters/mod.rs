#[cfg(any(feature = "provider-openai", feature = "provider-anthropic"))]
mod http;

#[cfg(feature = "provider-openai")]
pub mod openai;

#[cfg(feature = "provider-anthropic")]
pub mod anthropic;

#[cfg(feature = "provider-ollama")]
pub mod ollama;
