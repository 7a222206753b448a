//! Ollama provider served through its OpenAI-compatible endpoint.
//!
//! Chat traffic goes to `{host}/v1` while model discovery uses the native `/api/tags` listing,
//! which reports every locally pulled model.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;

use crate::adapters::http::{send_error, status_error};
use crate::adapters::openai::{OpenAiHttpTransport, OpenAiProvider};
use crate::{
    AvailableModel, BoxedEventStream, ModelProvider, ModelRequest, ModelResponse, ProviderError,
    ProviderFuture, ProviderKind, SecureCredentialManager,
};

pub const OLLAMA_HOST_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    inner: OpenAiProvider,
    client: Client,
    host_url: String,
}

impl OllamaProvider {
    pub fn new(credentials: Arc<SecureCredentialManager>, client: Client) -> Self {
        Self::with_host(credentials, client, OLLAMA_HOST_URL)
    }

    pub fn with_host(
        credentials: Arc<SecureCredentialManager>,
        client: Client,
        host_url: impl Into<String>,
    ) -> Self {
        let host_url = host_url.into().trim_end_matches('/').to_string();
        let transport = OpenAiHttpTransport::new(client.clone())
            .with_base_url(format!("{host_url}/v1"))
            .with_responses(false);

        Self {
            inner: OpenAiProvider::new(credentials, Arc::new(transport))
                .with_kind(ProviderKind::Ollama)
                .with_credential_id("ollama")
                .with_fallback_model("llama3.2"),
            client,
            host_url,
        }
    }

    pub fn with_credential_id(mut self, credential_id: impl Into<String>) -> Self {
        self.inner = self.inner.with_credential_id(credential_id);
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.inner = self.inner.with_fallback_model(model);
        self
    }

    pub fn host_url(&self) -> &str {
        &self.host_url
    }
}

impl ModelProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async move {
            let ids = list_ollama_models_with_client(&self.client, &self.host_url).await?;
            Ok(ids.into_iter().map(AvailableModel::new).collect())
        })
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        self.inner.complete(request)
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        self.inner.stream(request)
    }
}

pub async fn list_ollama_models() -> Result<Vec<String>, ProviderError> {
    list_ollama_models_with_client(&Client::new(), OLLAMA_HOST_URL).await
}

pub async fn list_ollama_models_with_client(
    client: &Client,
    host_url: &str,
) -> Result<Vec<String>, ProviderError> {
    let endpoint = format!("{}/api/tags", host_url.trim_end_matches('/'));
    let response = client.get(endpoint).send().await.map_err(send_error)?;

    if !response.status().is_success() {
        return Err(status_error(response, "Ollama").await);
    }

    let parsed = response
        .json::<OllamaTagsResponse>()
        .await
        .map_err(|err| ProviderError::transport(err.to_string()))?;

    Ok(parsed.into_model_ids())
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

impl OllamaTagsResponse {
    fn into_model_ids(self) -> Vec<String> {
        let mut ids = self
            .models
            .into_iter()
            .map(|tag| tag.name)
            .filter(|name| !name.trim().is_empty())
            .collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_listing_is_sorted_and_deduplicated() {
        let parsed: OllamaTagsResponse = serde_json::from_str(
            r#"{"models":[{"name":"qwen2.5:7b"},{"name":"llama3.2"},{"name":"llama3.2"},{"name":" "}]}"#,
        )
        .expect("tags should parse");

        assert_eq!(parsed.into_model_ids(), vec!["llama3.2", "qwen2.5:7b"]);
    }

    #[test]
    fn host_url_is_normalized() {
        let provider = OllamaProvider::with_host(
            Arc::new(SecureCredentialManager::new()),
            Client::new(),
            "http://gpu-box:11434/",
        );

        assert_eq!(provider.host_url(), "http://gpu-box:11434");
        assert_eq!(provider.kind(), ProviderKind::Ollama);
        assert!(!provider.supports_responses());
    }
}
