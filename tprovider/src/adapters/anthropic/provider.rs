//! Anthropic provider speaking the native Messages API.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::{
    AvailableModel, BoxedEventStream, ModelProvider, ModelRequest, ModelResponse, ProviderError,
    ProviderFuture, ProviderKind, SecretString, SecureCredentialManager,
};

use super::serde_api::{AnthropicStreamState, build_api_request};
use super::transport::AnthropicTransport;

#[derive(Clone)]
pub struct AnthropicProvider {
    credentials: Arc<SecureCredentialManager>,
    credential_id: String,
    transport: Arc<dyn AnthropicTransport>,
    fallback_model: String,
}

impl AnthropicProvider {
    pub fn new(
        credentials: Arc<SecureCredentialManager>,
        transport: Arc<dyn AnthropicTransport>,
    ) -> Self {
        Self {
            credentials,
            credential_id: "anthropic".to_string(),
            transport,
            fallback_model: "claude-sonnet-4-5".to_string(),
        }
    }

    pub fn with_credential_id(mut self, credential_id: impl Into<String>) -> Self {
        self.credential_id = credential_id.into();
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    fn api_key(&self) -> Result<SecretString, ProviderError> {
        self.credentials
            .api_key(&self.credential_id)?
            .ok_or_else(|| {
                ProviderError::authentication(format!(
                    "no Anthropic credentials configured for '{}'",
                    self.credential_id
                ))
            })
    }

    fn prepare(&self, mut request: ModelRequest) -> Result<ModelRequest, ProviderError> {
        if request.model.trim().is_empty() {
            request.model = self.fallback_model.clone();
        }
        request.validate()?;
        Ok(request)
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential_id", &self.credential_id)
            .field("fallback_model", &self.fallback_model)
            .finish_non_exhaustive()
    }
}

impl ModelProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async move {
            let api_key = self.api_key()?;
            self.transport.list_models(api_key).await
        })
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            let request = self.prepare(request)?;
            let api_key = self.api_key()?;
            let api_request = build_api_request(request, false)?;
            let response = self.transport.complete(api_request, api_key).await?;
            Ok(response.into_model_response())
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            let request = self.prepare(request)?;
            let api_key = self.api_key()?;
            let api_request = build_api_request(request, true)?;
            let mut events = self.transport.stream(api_request, api_key).await?;

            let stream = try_stream! {
                let mut state = AnthropicStreamState::default();
                while let Some(event) = events.next().await {
                    for mapped in state.map(event?)? {
                        yield mapped;
                    }
                    if state.is_finished() {
                        break;
                    }
                }
            };

            Ok(Box::pin(stream) as BoxedEventStream<'a>)
        })
    }
}

impl SecureCredentialManager {
    /// Stores an Anthropic key under the default `anthropic` credential id.
    pub fn set_anthropic_api_key(&self, api_key: impl Into<String>) -> Result<(), ProviderError> {
        let api_key = api_key.into();
        if !api_key.starts_with("sk-ant-") {
            return Err(ProviderError::authentication(
                "Anthropic API key must start with 'sk-ant-'",
            ));
        }

        self.set_api_key("anthropic", api_key)
    }
}
