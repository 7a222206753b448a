//! Builds provider adapters from catalog records.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::{
    ModelCatalog, ModelProvider, ProviderConfig, ProviderError, ProviderKind, ProviderRegistry,
    SecureCredentialManager,
};

#[derive(Clone)]
pub struct ProviderBuildConfig {
    pub provider: ProviderConfig,
    pub timeout: Duration,
    pub credentials: Arc<SecureCredentialManager>,
}

impl ProviderBuildConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(90),
            credentials: Arc::new(SecureCredentialManager::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shares one credential store across several providers.
    pub fn with_credentials(mut self, credentials: Arc<SecureCredentialManager>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Constructs the adapter for `config.provider`, storing its API key under the provider id.
///
/// OpenAI and Anthropic need a key. OpenAI-compatible hosts need a base URL and may run
/// without a key, as may Ollama.
pub fn build_provider(config: ProviderBuildConfig) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let ProviderBuildConfig {
        provider,
        timeout,
        credentials,
    } = config;

    let api_key = provider
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());
    match (api_key, provider.kind) {
        (Some(key), _) => credentials.set_api_key(provider.id.clone(), key)?,
        (None, ProviderKind::OpenAi | ProviderKind::Anthropic) => {
            return Err(ProviderError::authentication(format!(
                "provider '{}' needs an API key",
                provider.id
            )));
        }
        (None, _) => {}
    }

    let http = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::transport(err.to_string()))?;

    match provider.kind {
        ProviderKind::OpenAi | ProviderKind::OpenAiCompatible => {
            build_openai_provider(credentials, &provider, http)
        }
        ProviderKind::Anthropic => build_anthropic_provider(credentials, &provider, http),
        ProviderKind::Ollama => build_ollama_provider(credentials, &provider, http),
    }
}

/// Builds every enabled provider in `catalog`.
///
/// A provider that fails to build is logged and left out, so its models report "not active"
/// when used while the other providers keep working.
pub fn build_registry(
    catalog: &ModelCatalog,
    credentials: Arc<SecureCredentialManager>,
    timeout: Duration,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in catalog.providers().iter().filter(|provider| provider.enabled) {
        let config = ProviderBuildConfig::new(provider.clone())
            .with_timeout(timeout)
            .with_credentials(Arc::clone(&credentials));
        match build_provider(config) {
            Ok(adapter) => registry.register_shared(provider.id.clone(), adapter),
            Err(error) => tracing::warn!(
                event = "provider_skipped",
                provider = %provider.id,
                kind = %provider.kind,
                error = %error,
            ),
        }
    }
    registry
}

#[cfg(feature = "provider-openai")]
fn build_openai_provider(
    credentials: Arc<SecureCredentialManager>,
    provider: &ProviderConfig,
    http: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    use tprovider::adapters::openai::{OpenAiHttpTransport, OpenAiProvider};

    let adapter = match provider.kind {
        ProviderKind::OpenAiCompatible => {
            let base_url = provider.base_url.clone().ok_or_else(|| {
                ProviderError::invalid_request(format!(
                    "provider '{}' needs a base URL",
                    provider.id
                ))
            })?;
            let transport = OpenAiHttpTransport::new(http)
                .with_base_url(base_url)
                .with_responses(false);
            OpenAiProvider::compatible(credentials, provider.id.clone(), Arc::new(transport))
        }
        _ => {
            let mut transport = OpenAiHttpTransport::new(http);
            if let Some(base_url) = &provider.base_url {
                transport = transport.with_base_url(base_url.clone());
            }
            OpenAiProvider::new(credentials, Arc::new(transport))
                .with_credential_id(provider.id.clone())
        }
    };
    Ok(Arc::new(adapter))
}

#[cfg(not(feature = "provider-openai"))]
fn build_openai_provider(
    _credentials: Arc<SecureCredentialManager>,
    _provider: &ProviderConfig,
    _http: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    Err(ProviderError::unsupported(
        "provider-openai feature is not enabled on trellis",
    ))
}

#[cfg(feature = "provider-anthropic")]
fn build_anthropic_provider(
    credentials: Arc<SecureCredentialManager>,
    provider: &ProviderConfig,
    http: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    use tprovider::adapters::anthropic::{AnthropicHttpTransport, AnthropicProvider};

    let mut transport = AnthropicHttpTransport::new(http);
    if let Some(base_url) = &provider.base_url {
        transport = transport.with_base_url(base_url.clone());
    }
    Ok(Arc::new(
        AnthropicProvider::new(credentials, Arc::new(transport))
            .with_credential_id(provider.id.clone()),
    ))
}

#[cfg(not(feature = "provider-anthropic"))]
fn build_anthropic_provider(
    _credentials: Arc<SecureCredentialManager>,
    _provider: &ProviderConfig,
    _http: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    Err(ProviderError::unsupported(
        "provider-anthropic feature is not enabled on trellis",
    ))
}

#[cfg(feature = "provider-ollama")]
fn build_ollama_provider(
    credentials: Arc<SecureCredentialManager>,
    provider: &ProviderConfig,
    http: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    use tprovider::adapters::ollama::{OLLAMA_HOST_URL, OllamaProvider};

    let host = provider.base_url.as_deref().unwrap_or(OLLAMA_HOST_URL);
    Ok(Arc::new(
        OllamaProvider::with_host(credentials, http, host).with_credential_id(provider.id.clone()),
    ))
}

#[cfg(not(feature = "provider-ollama"))]
fn build_ollama_provider(
    _credentials: Arc<SecureCredentialManager>,
    _provider: &ProviderConfig,
    _http: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    Err(ProviderError::unsupported(
        "provider-ollama feature is not enabled on trellis",
    ))
}
