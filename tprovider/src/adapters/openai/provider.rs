//! OpenAI provider implementation over transport and shared models.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::{
    AvailableModel, BoxedEventStream, BuiltinTool, ModelProvider, ModelRequest, ModelResponse,
    ProviderError, ProviderFuture, ProviderKind, ResponseRequest, SecureCredentialManager,
    StreamEvent,
};

use super::auth::resolve_openai_auth;
use super::transport::{OpenAiChunkStream, OpenAiTransport};
use super::types::{OpenAiMessage, OpenAiRequest, OpenAiTool};

/// Chat-completions provider shared by OpenAI and OpenAI-compatible hosts.
///
/// The responses protocol is only offered for [`ProviderKind::OpenAi`] and only when the
/// transport exposes it.
#[derive(Clone)]
pub struct OpenAiProvider {
    credentials: Arc<SecureCredentialManager>,
    credential_id: String,
    transport: Arc<dyn OpenAiTransport>,
    kind: ProviderKind,
    fallback_model: String,
}

impl OpenAiProvider {
    pub fn new(
        credentials: Arc<SecureCredentialManager>,
        transport: Arc<dyn OpenAiTransport>,
    ) -> Self {
        Self {
            credentials,
            credential_id: "openai".to_string(),
            transport,
            kind: ProviderKind::OpenAi,
            fallback_model: "gpt-4o-mini".to_string(),
        }
    }

    /// Serves an OpenAI-compatible host registered under `credential_id`.
    pub fn compatible(
        credentials: Arc<SecureCredentialManager>,
        credential_id: impl Into<String>,
        transport: Arc<dyn OpenAiTransport>,
    ) -> Self {
        Self::new(credentials, transport)
            .with_kind(ProviderKind::OpenAiCompatible)
            .with_credential_id(credential_id)
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_credential_id(mut self, credential_id: impl Into<String>) -> Self {
        self.credential_id = credential_id.into();
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    fn resolve_model(&self, model: String) -> String {
        if model.trim().is_empty() {
            self.fallback_model.clone()
        } else {
            model
        }
    }

    fn prepare(&self, mut request: ModelRequest) -> Result<ModelRequest, ProviderError> {
        request.model = self.resolve_model(request.model);
        request.validate()?;
        Ok(request)
    }

    pub(crate) fn build_openai_request(&self, request: ModelRequest, stream: bool) -> OpenAiRequest {
        let web_search =
            self.kind.supports_native_web_search() && request.wants_builtin(BuiltinTool::WebSearch);
        let tools = request
            .function_tools()
            .cloned()
            .map(OpenAiTool::from)
            .collect::<Vec<_>>();

        OpenAiRequest {
            model: request.model,
            messages: request
                .messages
                .into_iter()
                .map(OpenAiMessage::from)
                .collect(),
            tools,
            web_search,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            stream,
            extra: request.extra,
        }
    }

    fn event_stream<'a>(mut chunks: OpenAiChunkStream<'a>) -> BoxedEventStream<'a> {
        let stream = try_stream! {
            while let Some(chunk) = chunks.next().await {
                yield StreamEvent::from(chunk?);
            }
        };

        Box::pin(stream)
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential_id", &self.credential_id)
            .field("kind", &self.kind)
            .field("fallback_model", &self.fallback_model)
            .finish_non_exhaustive()
    }
}

impl ModelProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async move {
            let auth = resolve_openai_auth(&self.credentials, &self.credential_id, self.kind)?;
            let ids = self.transport.list_models(auth).await?;
            Ok(ids.into_iter().map(AvailableModel::new).collect())
        })
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            let request = self.prepare(request)?;
            let auth = resolve_openai_auth(&self.credentials, &self.credential_id, self.kind)?;
            let openai_request = self.build_openai_request(request, false);
            let response = self.transport.complete(openai_request, auth).await?;
            Ok(response.into_model_response(self.kind))
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            let request = self.prepare(request)?;
            let auth = resolve_openai_auth(&self.credentials, &self.credential_id, self.kind)?;
            let openai_request = self.build_openai_request(request, true);
            let chunks = self.transport.stream(openai_request, auth).await?;
            Ok(Self::event_stream(chunks))
        })
    }

    fn supports_responses(&self) -> bool {
        self.kind == ProviderKind::OpenAi && self.transport.supports_responses()
    }

    fn create_response<'a>(
        &'a self,
        mut request: ResponseRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            if !self.supports_responses() {
                return Err(ProviderError::unsupported(format!(
                    "{} does not support the responses protocol",
                    self.kind
                )));
            }
            request.model = self.resolve_model(request.model);
            request.validate()?;
            let auth = resolve_openai_auth(&self.credentials, &self.credential_id, self.kind)?;
            let response = self.transport.create_response(request, auth).await?;
            Ok(response.into_model_response(self.kind))
        })
    }

    fn stream_response<'a>(
        &'a self,
        mut request: ResponseRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            if !self.supports_responses() {
                return Err(ProviderError::unsupported(format!(
                    "{} does not support the responses protocol",
                    self.kind
                )));
            }
            request.model = self.resolve_model(request.model);
            request.validate()?;
            let auth = resolve_openai_auth(&self.credentials, &self.credential_id, self.kind)?;
            let chunks = self.transport.stream_response(request, auth).await?;
            Ok(Self::event_stream(chunks))
        })
    }
}
