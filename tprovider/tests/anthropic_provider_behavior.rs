#![cfg(feature = "provider-anthropic")]

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::json;
use tprovider::adapters::anthropic::{
    AnthropicApiRequest, AnthropicApiResponse, AnthropicEventStream, AnthropicProvider,
    AnthropicStreamEvent, AnthropicTransport,
};
use tprovider::{
    Message, ModelProvider, ModelRequest, ProviderError, ProviderErrorKind, ProviderFuture,
    ProviderKind, SecretString, SecureCredentialManager, StopReason, StreamAccumulator,
};

#[derive(Debug, Default)]
struct FakeTransport {
    captured: Mutex<Option<(AnthropicApiRequest, String)>>,
}

impl FakeTransport {
    fn captured(&self) -> (AnthropicApiRequest, String) {
        self.captured
            .lock()
            .expect("capture lock")
            .clone()
            .expect("request should be captured")
    }
}

impl AnthropicTransport for FakeTransport {
    fn complete<'a>(
        &'a self,
        request: AnthropicApiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<AnthropicApiResponse, ProviderError>> {
        Box::pin(async move {
            *self.captured.lock().expect("capture lock") =
                Some((request, api_key.expose().to_string()));
            serde_json::from_value(json!({
                "model": "claude-test",
                "content": [{"type": "text", "text": "Bonjour"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 4, "output_tokens": 2}
            }))
            .map_err(|err| ProviderError::transport(err.to_string()))
        })
    }

    fn stream<'a>(
        &'a self,
        request: AnthropicApiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<AnthropicEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            *self.captured.lock().expect("capture lock") =
                Some((request, api_key.expose().to_string()));
            let raw = vec![
                json!({"type":"message_start","message":{"model":"claude-test","usage":{"input_tokens":8}}}),
                json!({"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}),
                json!({"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"plan"}}),
                json!({"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_a","name":"weather","input":{}}}),
                json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}),
                json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"Oslo\"}"}}),
                json!({"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":11}}),
                json!({"type":"message_stop"}),
            ];
            let events = raw
                .into_iter()
                .map(|value| {
                    serde_json::from_value::<AnthropicStreamEvent>(value)
                        .map_err(|err| ProviderError::transport(err.to_string()))
                })
                .collect::<Vec<_>>();
            Ok(Box::pin(futures_util::stream::iter(events)) as AnthropicEventStream<'a>)
        })
    }
}

fn credentials() -> Arc<SecureCredentialManager> {
    let credentials = Arc::new(SecureCredentialManager::new());
    credentials
        .set_anthropic_api_key("sk-ant-test")
        .expect("key should store");
    credentials
}

#[tokio::test]
async fn complete_sends_native_body_with_key() {
    let transport = Arc::new(FakeTransport::default());
    let provider = AnthropicProvider::new(credentials(), transport.clone());

    let response = provider
        .complete(ModelRequest::new(
            "claude-test",
            vec![Message::system("answer in French"), Message::user("hello")],
        ))
        .await
        .expect("completion works");

    assert_eq!(response.provider, ProviderKind::Anthropic);
    assert_eq!(response.text(), "Bonjour");
    assert_eq!(response.stop_reason, StopReason::EndTurn);

    let (request, key) = transport.captured();
    assert_eq!(key, "sk-ant-test");
    assert_eq!(request.system.as_deref(), Some("answer in French"));
    assert_eq!(request.messages.len(), 1);
    assert!(!request.stream);
}

#[tokio::test]
async fn stream_yields_reasoning_and_reassembled_tool_call() {
    let provider = AnthropicProvider::new(credentials(), Arc::new(FakeTransport::default()));
    let mut stream = provider
        .stream(ModelRequest::new("claude-test", vec![Message::user("weather?")]))
        .await
        .expect("stream opens");

    let mut accumulator = StreamAccumulator::default();
    while let Some(event) = stream.next().await {
        accumulator.apply(&event.expect("event ok"));
    }

    let response = accumulator.finish(ProviderKind::Anthropic, "claude-test");
    assert_eq!(response.reasoning().as_deref(), Some("plan"));
    assert_eq!(response.stop_reason, StopReason::ToolUse);
    let calls = response.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "toolu_a");
    assert_eq!(calls[0].arguments, "{\"city\":\"Oslo\"}");
    assert_eq!(response.usage.input_tokens, 8);
    assert_eq!(response.usage.output_tokens, 11);
}

#[tokio::test]
async fn missing_or_malformed_key_is_an_authentication_error() {
    let credentials = Arc::new(SecureCredentialManager::new());
    let err = credentials
        .set_anthropic_api_key("sk-openai")
        .expect_err("prefix is enforced");
    assert_eq!(err.kind, ProviderErrorKind::Authentication);

    let provider = AnthropicProvider::new(credentials, Arc::new(FakeTransport::default()));
    let err = provider
        .complete(ModelRequest::new("claude-test", vec![Message::user("hi")]))
        .await
        .expect_err("no key configured");
    assert_eq!(err.kind, ProviderErrorKind::Authentication);
}
