#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tchat::{ChatPolicy, ConversationService, ConversationServiceBuilder};
use tokio::sync::Notify;
use tprovider::{
    AvailableModel, BoxedEventStream, ModelCatalog, ModelConfig, ModelKey, ModelProvider,
    ModelRequest, ModelResponse, ProviderConfig, ProviderError, ProviderFuture, ProviderKind,
    ProviderRegistry, ResponseRequest, RetryPolicies, StopReason, StreamAccumulator, StreamEvent,
    TokenUsage, ToolCall, ToolCallDelta, VecEventStream,
};
use ttree::MessageTreeStore;

pub const PROVIDER: &str = "fake";
pub const MODEL: &str = "m1";

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Reasoned { reasoning: String, text: String },
    Tools(Vec<ToolCall>),
    Fail(ProviderError),
    /// Never answers; the turn can only end by cancellation.
    Hang,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn tool(id: &str, name: &str, arguments: &str) -> Self {
        Self::Tools(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }
}

/// Provider that answers from a script and records every request it receives.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
    response_requests: Mutex<Vec<ResponseRequest>>,
    responses_protocol: bool,
    listed: Vec<AvailableModel>,
    /// Notified each time a request reaches the provider.
    pub entered: Notify,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn with_responses_protocol(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            responses_protocol: true,
            ..Self::default()
        })
    }

    pub fn with_listed_models(listed: Vec<AvailableModel>) -> Arc<Self> {
        Arc::new(Self {
            listed,
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn response_requests(&self) -> Vec<ResponseRequest> {
        self.response_requests
            .lock()
            .expect("response requests lock")
            .clone()
    }

    fn next_reply(&self) -> Reply {
        let reply = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Reply::text("ok"));
        self.entered.notify_one();
        reply
    }
}

impl ModelProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async move { Ok(self.listed.clone()) })
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            let model = request.model.clone();
            self.requests.lock().expect("requests lock").push(request);
            respond(self.next_reply(), &model).await
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            let events = script_events(self.next_reply()).await?;
            Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
        })
    }

    fn supports_responses(&self) -> bool {
        self.responses_protocol
    }

    fn create_response<'a>(
        &'a self,
        request: ResponseRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            let model = request.model.clone();
            self.response_requests
                .lock()
                .expect("response requests lock")
                .push(request);
            respond(self.next_reply(), &model).await
        })
    }

    fn stream_response<'a>(
        &'a self,
        request: ResponseRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.response_requests
                .lock()
                .expect("response requests lock")
                .push(request);
            let events = script_events(self.next_reply()).await?;
            Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
        })
    }
}

async fn respond(reply: Reply, model: &str) -> Result<ModelResponse, ProviderError> {
    let mut accumulator = StreamAccumulator::default();
    for event in script_events(reply).await? {
        accumulator.apply(&event?);
    }
    Ok(accumulator.finish(ProviderKind::OpenAiCompatible, model))
}

async fn script_events(
    reply: Reply,
) -> Result<Vec<Result<StreamEvent, ProviderError>>, ProviderError> {
    let mut events = Vec::new();
    match reply {
        Reply::Hang => std::future::pending::<()>().await,
        Reply::Fail(error) => return Err(error),
        Reply::Text(text) => push_text(&mut events, &text),
        Reply::Reasoned { reasoning, text } => {
            events.push(Ok(StreamEvent::ReasoningDelta(reasoning)));
            push_text(&mut events, &text);
        }
        Reply::Tools(calls) => {
            for (index, call) in calls.into_iter().enumerate() {
                let index = index as u32;
                events.push(Ok(StreamEvent::ToolCallDelta(
                    ToolCallDelta::new(index).with_id(call.id).with_name(call.name),
                )));
                events.push(Ok(StreamEvent::ToolCallDelta(
                    ToolCallDelta::new(index).with_arguments(call.arguments),
                )));
            }
            events.push(Ok(StreamEvent::Usage(TokenUsage::new(4, 2))));
            events.push(Ok(StreamEvent::Finished(StopReason::ToolUse)));
            return Ok(events);
        }
    }
    events.push(Ok(StreamEvent::Usage(TokenUsage::new(5, 3))));
    events.push(Ok(StreamEvent::Finished(StopReason::EndTurn)));
    Ok(events)
}

fn push_text(events: &mut Vec<Result<StreamEvent, ProviderError>>, text: &str) {
    for chunk in text.split_inclusive(' ') {
        events.push(Ok(StreamEvent::TextDelta(chunk.to_string())));
    }
}

pub fn model_key() -> ModelKey {
    ModelKey::new(PROVIDER, MODEL)
}

pub fn catalog() -> ModelCatalog {
    catalog_with(ModelConfig::new(PROVIDER, MODEL))
}

pub fn catalog_with(model: ModelConfig) -> ModelCatalog {
    ModelCatalog::new()
        .with_provider(ProviderConfig::new(PROVIDER, ProviderKind::OpenAiCompatible))
        .with_model(model)
}

pub fn registry(provider: &Arc<ScriptedProvider>) -> ProviderRegistry {
    let shared: Arc<dyn ModelProvider> = provider.clone();
    let mut registry = ProviderRegistry::new();
    registry.register_shared(PROVIDER, shared);
    registry
}

pub fn policy() -> ChatPolicy {
    ChatPolicy::default()
        .with_default_model(model_key())
        .with_auto_title(false)
}

/// Service over an in-memory store with retries disabled and titles off.
pub fn builder(provider: &Arc<ScriptedProvider>) -> ConversationServiceBuilder {
    ConversationService::builder(MessageTreeStore::in_memory())
        .catalog(catalog())
        .providers(registry(provider))
        .retry_policies(RetryPolicies::disabled())
        .policy(policy())
}

pub fn contents(messages: &[ttree::StoredMessage]) -> Vec<&str> {
    messages
        .iter()
        .map(|message| message.content.as_str())
        .collect()
}
