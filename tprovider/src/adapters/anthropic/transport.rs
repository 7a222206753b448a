//! Anthropic transport trait and reqwest-based HTTP implementation.

use std::pin::Pin;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::Client;

use crate::adapters::http::{SseBuffer, send_error, status_error};
use crate::{AvailableModel, ProviderError, ProviderFuture, SecretString};

use super::serde_api::{
    ANTHROPIC_VERSION, AnthropicApiModelList, AnthropicApiRequest, AnthropicApiResponse,
    AnthropicStreamEvent,
};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

pub type AnthropicEventStream<'a> =
    Pin<Box<dyn Stream<Item = Result<AnthropicStreamEvent, ProviderError>> + Send + 'a>>;

pub trait AnthropicTransport: Send + Sync + std::fmt::Debug {
    fn complete<'a>(
        &'a self,
        request: AnthropicApiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<AnthropicApiResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: AnthropicApiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<AnthropicEventStream<'a>, ProviderError>>;

    fn list_models<'a>(
        &'a self,
        _api_key: SecretString,
    ) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicHttpTransport {
    client: Client,
    base_url: String,
}

impl AnthropicHttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: ANTHROPIC_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(
        builder: reqwest::RequestBuilder,
        api_key: &SecretString,
    ) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    async fn post_messages(
        &self,
        request: &AnthropicApiRequest,
        api_key: &SecretString,
    ) -> Result<reqwest::Response, ProviderError> {
        let builder = self.client.post(self.endpoint("messages")).json(request);
        let response = Self::authorize(builder, api_key)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(status_error(response, "Anthropic").await);
        }

        Ok(response)
    }
}

impl AnthropicTransport for AnthropicHttpTransport {
    fn complete<'a>(
        &'a self,
        mut request: AnthropicApiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<AnthropicApiResponse, ProviderError>> {
        Box::pin(async move {
            request.stream = false;
            let response = self.post_messages(&request, &api_key).await?;
            response
                .json::<AnthropicApiResponse>()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))
        })
    }

    fn stream<'a>(
        &'a self,
        mut request: AnthropicApiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<AnthropicEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.stream = true;
            let response = self.post_messages(&request, &api_key).await?;

            let stream = try_stream! {
                let mut chunks = response.bytes_stream();
                let mut sse = SseBuffer::default();

                loop {
                    let payload = match sse.next_payload()? {
                        Some(payload) => payload,
                        None => match chunks.next().await {
                            Some(item) => {
                                let bytes =
                                    item.map_err(|err| ProviderError::transport(err.to_string()))?;
                                sse.push(&bytes);
                                continue;
                            }
                            None => match sse.finish()? {
                                Some(payload) => payload,
                                None => break,
                            },
                        },
                    };

                    let event: AnthropicStreamEvent = serde_json::from_str(&payload)
                        .map_err(|err| ProviderError::transport(err.to_string()))?;
                    let done = matches!(event, AnthropicStreamEvent::MessageStop);
                    yield event;
                    if done {
                        break;
                    }
                }
            };

            Ok(Box::pin(stream) as AnthropicEventStream<'a>)
        })
    }

    fn list_models<'a>(
        &'a self,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async move {
            let builder = self.client.get(self.endpoint("models"));
            let response = Self::authorize(builder, &api_key)
                .send()
                .await
                .map_err(send_error)?;

            if !response.status().is_success() {
                return Err(status_error(response, "Anthropic").await);
            }

            let parsed: AnthropicApiModelList = response
                .json()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))?;

            Ok(parsed
                .data
                .into_iter()
                .map(|model| {
                    let available = AvailableModel::new(model.id);
                    match model.display_name {
                        Some(name) => available.with_display_name(name),
                        None => available,
                    }
                })
                .collect())
        })
    }
}
