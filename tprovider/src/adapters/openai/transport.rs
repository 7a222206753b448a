//! OpenAI transport trait and reqwest-based HTTP implementation.

use std::pin::Pin;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::Client;

use crate::adapters::http::{SseBuffer, send_error, status_error};
use crate::{ProviderError, ProviderFuture, ResponseRequest};

use super::responses_api::{
    ResponsesApiResponse, ResponsesApiStreamEvent, build_responses_request, map_stream_event,
};
use super::serde_api::{
    OpenAiApiModelList, OpenAiApiResponse, OpenAiApiStreamResponse, build_api_request,
    parse_finish_reason,
};
use super::types::{OpenAiAuth, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub type OpenAiChunkStream<'a> =
    Pin<Box<dyn Stream<Item = Result<OpenAiStreamChunk, ProviderError>> + Send + 'a>>;

pub trait OpenAiTransport: Send + Sync + std::fmt::Debug {
    fn complete<'a>(
        &'a self,
        request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>>;

    fn list_models<'a>(
        &'a self,
        _auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<Vec<String>, ProviderError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn supports_responses(&self) -> bool {
        false
    }

    fn create_response<'a>(
        &'a self,
        _request: ResponseRequest,
        _auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async { Err(ProviderError::unsupported("transport has no responses endpoint")) })
    }

    fn stream_response<'a>(
        &'a self,
        _request: ResponseRequest,
        _auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>> {
        Box::pin(async { Err(ProviderError::unsupported("transport has no responses endpoint")) })
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiHttpTransport {
    client: Client,
    base_url: String,
    responses: bool,
}

impl OpenAiHttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: OPENAI_BASE_URL.to_string(),
            responses: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Enables or disables the `/responses` endpoint for this host.
    pub fn with_responses(mut self, enabled: bool) -> Self {
        self.responses = enabled;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn apply_auth(
        &self,
        builder: reqwest::RequestBuilder,
        auth: &OpenAiAuth,
    ) -> reqwest::RequestBuilder {
        match auth {
            OpenAiAuth::ApiKey(key) => builder.bearer_auth(key.expose()),
            OpenAiAuth::Anonymous => builder,
        }
    }

    async fn post<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
        auth: &OpenAiAuth,
    ) -> Result<reqwest::Response, ProviderError> {
        let builder = self.client.post(self.endpoint(path)).json(body);
        let response = self
            .apply_auth(builder, auth)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(status_error(response, "OpenAI").await);
        }

        Ok(response)
    }
}

impl OpenAiTransport for OpenAiHttpTransport {
    fn complete<'a>(
        &'a self,
        mut request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async move {
            request.stream = false;
            let api_request = build_api_request(request)?;
            let response = self.post("chat/completions", &api_request, &auth).await?;

            let parsed: OpenAiApiResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))?;

            OpenAiResponse::try_from(parsed)
        })
    }

    fn stream<'a>(
        &'a self,
        mut request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.stream = true;
            let api_request = build_api_request(request)?;
            let response = self.post("chat/completions", &api_request, &auth).await?;

            let stream = try_stream! {
                let mut chunks = response.bytes_stream();
                let mut sse = SseBuffer::default();
                let mut finished = false;
                let mut finish_reason = None;

                while !finished {
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

                    if payload == "[DONE]" {
                        finished = true;
                        continue;
                    }

                    let parsed: OpenAiApiStreamResponse = serde_json::from_str(&payload)
                        .map_err(|err| ProviderError::transport(err.to_string()))?;

                    if let Some(usage) = parsed.usage {
                        yield OpenAiStreamChunk::Usage(usage.into());
                    }

                    let Some(choice) = parsed.choices.into_iter().next() else {
                        continue;
                    };

                    if let Some(reasoning) = choice.delta.reasoning_content
                        && !reasoning.is_empty()
                    {
                        yield OpenAiStreamChunk::ReasoningDelta(reasoning);
                    }

                    if let Some(content) = choice.delta.content
                        && !content.is_empty()
                    {
                        yield OpenAiStreamChunk::TextDelta(content);
                    }

                    for delta_call in choice.delta.tool_calls.unwrap_or_default() {
                        let (name, arguments) = match delta_call.function {
                            Some(function) => (function.name, function.arguments),
                            None => (None, None),
                        };
                        yield OpenAiStreamChunk::ToolCallDelta {
                            index: delta_call.index.unwrap_or(0),
                            id: delta_call.id,
                            name,
                            arguments,
                        };
                    }

                    if choice.finish_reason.is_some() {
                        finish_reason = Some(parse_finish_reason(choice.finish_reason.as_deref()));
                    }
                }

                if let Some(reason) = finish_reason {
                    yield OpenAiStreamChunk::Finished(reason);
                }
            };

            Ok(Box::pin(stream) as OpenAiChunkStream<'a>)
        })
    }

    fn list_models<'a>(
        &'a self,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<Vec<String>, ProviderError>> {
        Box::pin(async move {
            let builder = self.client.get(self.endpoint("models"));
            let response = self
                .apply_auth(builder, &auth)
                .send()
                .await
                .map_err(send_error)?;

            if !response.status().is_success() {
                return Err(status_error(response, "OpenAI").await);
            }

            let parsed: OpenAiApiModelList = response
                .json()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))?;

            let mut ids = parsed.data.into_iter().map(|model| model.id).collect::<Vec<_>>();
            ids.sort();
            Ok(ids)
        })
    }

    fn supports_responses(&self) -> bool {
        self.responses
    }

    fn create_response<'a>(
        &'a self,
        request: ResponseRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async move {
            let api_request = build_responses_request(request, false)?;
            let response = self.post("responses", &api_request, &auth).await?;

            let parsed: ResponsesApiResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))?;

            Ok(OpenAiResponse::from(parsed))
        })
    }

    fn stream_response<'a>(
        &'a self,
        request: ResponseRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            let api_request = build_responses_request(request, true)?;
            let response = self.post("responses", &api_request, &auth).await?;

            let stream = try_stream! {
                let mut chunks = response.bytes_stream();
                let mut sse = SseBuffer::default();
                let mut finished = false;

                while !finished {
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

                    let event: ResponsesApiStreamEvent = serde_json::from_str(&payload)
                        .map_err(|err| ProviderError::transport(err.to_string()))?;

                    for chunk in map_stream_event(event)? {
                        if matches!(chunk, OpenAiStreamChunk::Finished(_)) {
                            finished = true;
                        }
                        yield chunk;
                    }
                }
            };

            Ok(Box::pin(stream) as OpenAiChunkStream<'a>)
        })
    }
}
