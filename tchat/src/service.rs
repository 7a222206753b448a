//! The conversation service: send, edit, regenerate and branch over a message tree.
//!
//! A turn moves through [`TurnState`]s per thread. Every turn ends in a stored reply, a stored
//! error note, or (when cancelled) nothing beyond what was already stored.

use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Instant;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tcommon::{MessageId, ThreadId};
use tprovider::{
    BoxedEventStream, ManualModel, ModelCatalog, ModelKey, ModelOverride, ModelProvider,
    ModelRequest, ModelResponse, NoopOperationHooks, ProtocolKind, ProviderError, ProviderKind, ProviderOperationHooks,
    ProviderRegistry, ResolvedModel, ResponseRequest, RetryPolicies, Role, StreamAccumulator,
    StreamEvent, fetch_model_catalog, with_retry,
};
use ttooling::{DefaultToolRuntime, ToolExecutionContext, ToolRuntime};
use ttree::{
    Attachment, LeafPointer, MessageTreeStore, NewMessage, ParentSelector, StoredMessage,
    ThreadSettings, UsageMetrics,
};

use crate::history::{build_history, extract_inline_images};
use crate::inflight::{InFlightTurns, TurnTicket};
use crate::tools::run_tool_call;
use crate::{
    ChatError, ChatErrorPhase, ConversationHooks, EditMode, EditOutcome, EditRequest,
    NoopConversationHooks, NoopStreamSink, ProviderTitleGenerator, RegenerateMode, SendRequest,
    StreamSink, TitleGenerator, TitleRequest, TurnOutcome, TurnResult, TurnState,
};

/// Service-wide defaults. Per-thread settings win where both are set.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPolicy {
    /// Model for new threads when the send request names none.
    pub default_model: Option<ModelKey>,
    pub system_prompt: Option<String>,
    /// Maximum number of history messages per request.
    pub context_window: Option<usize>,
    pub max_tokens: Option<u32>,
    pub auto_title: bool,
    /// Tool rounds allowed per turn. `None` leaves it to the model.
    pub max_tool_rounds: Option<u32>,
    /// Stream replies from models that support it.
    pub streaming: bool,
    pub new_thread_title: String,
}

impl Default for ChatPolicy {
    fn default() -> Self {
        Self {
            default_model: None,
            system_prompt: None,
            context_window: None,
            max_tokens: None,
            auto_title: true,
            max_tool_rounds: None,
            streaming: true,
            new_thread_title: "New conversation".to_string(),
        }
    }
}

impl ChatPolicy {
    pub fn with_default_model(mut self, model: ModelKey) -> Self {
        self.default_model = Some(model);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_context_window(mut self, messages: usize) -> Self {
        self.context_window = Some(messages);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    pub fn with_auto_title(mut self, enabled: bool) -> Self {
        self.auto_title = enabled;
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }
}

#[derive(Clone)]
pub struct ConversationService {
    store: MessageTreeStore,
    catalog: Arc<RwLock<ModelCatalog>>,
    providers: ProviderRegistry,
    tools: Arc<dyn ToolRuntime>,
    policy: ChatPolicy,
    retry_policies: RetryPolicies,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
    hooks: Arc<dyn ConversationHooks>,
    sink: Arc<dyn StreamSink>,
    titles: Arc<dyn TitleGenerator>,
    in_flight: Arc<InFlightTurns>,
}

pub struct ConversationServiceBuilder {
    store: MessageTreeStore,
    catalog: ModelCatalog,
    providers: ProviderRegistry,
    tools: Option<Arc<dyn ToolRuntime>>,
    policy: ChatPolicy,
    retry_policies: RetryPolicies,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
    hooks: Arc<dyn ConversationHooks>,
    sink: Arc<dyn StreamSink>,
    titles: Arc<dyn TitleGenerator>,
}

impl ConversationServiceBuilder {
    pub fn new(store: MessageTreeStore) -> Self {
        Self {
            store,
            catalog: ModelCatalog::new(),
            providers: ProviderRegistry::new(),
            tools: None,
            policy: ChatPolicy::default(),
            retry_policies: RetryPolicies::default(),
            provider_hooks: Arc::new(NoopOperationHooks),
            hooks: Arc::new(NoopConversationHooks),
            sink: Arc::new(NoopStreamSink),
            titles: Arc::new(ProviderTitleGenerator),
        }
    }

    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolRuntime>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn policy(mut self, policy: ChatPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_policies(mut self, retry_policies: RetryPolicies) -> Self {
        self.retry_policies = retry_policies;
        self
    }

    pub fn provider_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.provider_hooks = hooks;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ConversationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn stream_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn title_generator(mut self, titles: Arc<dyn TitleGenerator>) -> Self {
        self.titles = titles;
        self
    }

    pub fn build(self) -> ConversationService {
        ConversationService {
            store: self.store,
            catalog: Arc::new(RwLock::new(self.catalog)),
            providers: self.providers,
            tools: self
                .tools
                .unwrap_or_else(|| Arc::new(DefaultToolRuntime::default())),
            policy: self.policy,
            retry_policies: self.retry_policies,
            provider_hooks: self.provider_hooks,
            hooks: self.hooks,
            sink: self.sink,
            titles: self.titles,
            in_flight: Arc::new(InFlightTurns::default()),
        }
    }
}

/// Everything one turn needs, resolved before anything is written.
struct TurnPlan {
    resolved: ResolvedModel,
    provider: Arc<dyn ModelProvider>,
    system_prompt: Option<String>,
    context_window: Option<usize>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    extra: Map<String, Value>,
}

impl TurnPlan {
    fn model_label(&self) -> String {
        self.resolved.model.key().to_string()
    }

    fn tool_context(&self, thread_id: &ThreadId) -> ToolExecutionContext {
        ToolExecutionContext::for_thread(thread_id.clone())
            .with_model(self.resolved.provider.kind, self.resolved.model.capabilities)
    }
}

/// Clears the thread's in-flight entry when the turn ends, however it ends.
struct TurnGuard {
    turns: Arc<InFlightTurns>,
    hooks: Arc<dyn ConversationHooks>,
    ticket: TurnTicket,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if self.turns.finish(&self.ticket) {
            self.hooks
                .on_turn_state(&self.ticket.thread_id, TurnState::Idle);
        }
    }
}

enum PreparedRequest {
    Chat(ModelRequest),
    Responses(ResponseRequest),
}

impl PreparedRequest {
    fn operation(&self, streaming: bool) -> &'static str {
        match (self, streaming) {
            (Self::Chat(_), false) => "complete",
            (Self::Chat(_), true) => "stream",
            (Self::Responses(_), false) => "create_response",
            (Self::Responses(_), true) => "stream_response",
        }
    }

    async fn complete(&self, provider: &dyn ModelProvider) -> Result<ModelResponse, ProviderError> {
        match self {
            Self::Chat(request) => provider.complete(request.clone()).await,
            Self::Responses(request) => provider.create_response(request.clone()).await,
        }
    }

    async fn open_stream<'a>(
        &self,
        provider: &'a dyn ModelProvider,
    ) -> Result<BoxedEventStream<'a>, ProviderError> {
        match self {
            Self::Chat(request) => provider.stream(request.clone()).await,
            Self::Responses(request) => provider.stream_response(request.clone()).await,
        }
    }
}

impl ConversationService {
    pub fn builder(store: MessageTreeStore) -> ConversationServiceBuilder {
        ConversationServiceBuilder::new(store)
    }

    pub fn store(&self) -> &MessageTreeStore {
        &self.store
    }

    pub fn policy(&self) -> &ChatPolicy {
        &self.policy
    }

    pub fn tools(&self) -> Arc<dyn ToolRuntime> {
        Arc::clone(&self.tools)
    }

    pub fn catalog(&self) -> Result<ModelCatalog, ChatError> {
        Ok(self.read_catalog()?.clone())
    }

    /// Applies `update` to the live catalog. Later sends see the change.
    pub fn update_catalog(
        &self,
        update: impl FnOnce(&mut ModelCatalog),
    ) -> Result<(), ChatError> {
        let mut catalog = self
            .catalog
            .write()
            .map_err(|_| ChatError::configuration("model catalog lock poisoned"))?;
        update(&mut catalog);
        Ok(())
    }

    /// Re-lists a registered provider's models and merges them into the live catalog.
    pub async fn refresh_models(
        &self,
        provider_id: &str,
        manual_models: &[ManualModel],
        overrides: &[ModelOverride],
    ) -> Result<usize, ChatError> {
        let provider = self.providers.get(provider_id).ok_or_else(|| {
            ChatError::configuration(format!("provider '{provider_id}' is not registered"))
        })?;
        let models =
            fetch_model_catalog(provider_id, provider.as_ref(), manual_models, overrides).await?;
        let count = models.len();
        self.update_catalog(|catalog| catalog.replace_models(provider_id, models))?;
        tracing::info!(event = "models_refreshed", provider_id, models = count);
        Ok(count)
    }

    pub fn turn_state(&self, thread_id: &ThreadId) -> TurnState {
        self.in_flight.state(thread_id)
    }

    /// Number of threads with a turn in flight.
    pub fn in_flight_turns(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancels the thread's in-flight turn. Returns whether one was running.
    pub fn stop(&self, thread_id: &ThreadId) -> bool {
        let stopped = self.in_flight.cancel(thread_id);
        if stopped {
            tracing::info!(event = "turn_stopped", thread_id = %thread_id);
            self.hooks.on_turn_state(thread_id, TurnState::Idle);
        }
        stopped
    }

    pub async fn active_path(&self, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, ChatError> {
        Ok(self.store.get_active_path(thread_id, None).await?)
    }

    pub async fn switch_branch(&self, message_id: &MessageId) -> Result<MessageId, ChatError> {
        let message = self.store.get_message(message_id).await?;
        let leaf = self.store.switch_branch(message_id).await?;
        self.sink.on_active_path_changed(&message.thread_id);
        Ok(leaf)
    }

    /// Stores the user's message as a new leaf and runs the turn loop.
    ///
    /// Starting a new thread requires a model from the request or the policy. Configuration
    /// problems are reported before anything is stored.
    pub async fn send(&self, request: SendRequest) -> Result<TurnResult, ChatError> {
        if request.text.trim().is_empty() && request.attachments.is_empty() {
            return Err(ChatError::invalid_request("message must not be empty"));
        }

        let SendRequest {
            thread_id,
            text,
            attachments,
            parent,
            model,
        } = request;

        let (thread, created_thread, plan) = match thread_id {
            Some(thread_id) => {
                let thread = self.store.get_thread(&thread_id).await?;
                let plan = self.plan(&thread.settings)?;
                (thread, false, plan)
            }
            None => {
                let model = model
                    .or_else(|| self.policy.default_model.clone())
                    .ok_or_else(|| ChatError::configuration("no model selected for new thread"))?;
                let settings = ThreadSettings::for_model(model);
                let plan = self.plan(&settings)?;
                let thread = self
                    .store
                    .create_thread(self.policy.new_thread_title.clone(), settings)
                    .await?;
                tracing::info!(event = "thread_created", thread_id = %thread.id);
                (thread, true, plan)
            }
        };

        let started = Instant::now();
        let guard = self.begin_turn(&thread.id);
        let user = self
            .store
            .append_message(
                NewMessage::user(thread.id.clone(), text.clone())
                    .with_attachments(attachments)
                    .with_parent(parent),
            )
            .await?;
        self.announce(&user);
        self.set_state(&guard.ticket, TurnState::UserMessagePersisted);

        let mut result = self
            .run_turn(&guard, &plan, user.id.clone(), vec![user], started)
            .await?;
        result.created_thread = created_thread;

        if created_thread
            && self.policy.auto_title
            && result.is_completed()
            && let Some(reply) = result.final_message()
        {
            self.spawn_title(&thread.id, &plan, text, reply.content.clone());
        }

        Ok(result)
    }

    /// Applies an edit. [`EditMode::Save`] only rewrites; the other modes also ask the model
    /// again and are limited to user messages.
    pub async fn edit(&self, request: EditRequest) -> Result<EditOutcome, ChatError> {
        let original = self.store.get_message(&request.message_id).await?;
        let attachments = merge_attachments(
            &original.attachments,
            &request.removed_attachment_ids,
            request.new_attachments,
        );

        if request.mode == EditMode::Save {
            let message = self
                .store
                .update_message_content(&original.id, request.content, attachments)
                .await?;
            self.sink.on_active_path_changed(&message.thread_id);
            return Ok(EditOutcome {
                message,
                turn: None,
            });
        }

        if original.role != Role::User {
            return Err(ChatError::invalid_request(
                "only user messages can be edited and resent",
            ));
        }

        let thread = self.store.get_thread(&original.thread_id).await?;
        let plan = self.plan(&thread.settings)?;
        let started = Instant::now();
        let guard = self.begin_turn(&thread.id);

        let (message, persisted) = match request.mode {
            EditMode::Branch => {
                let parent = match &original.parent_id {
                    Some(parent) => ParentSelector::Message(parent.clone()),
                    None => ParentSelector::Root,
                };
                let sibling = self
                    .store
                    .append_message(
                        NewMessage::user(thread.id.clone(), request.content)
                            .with_attachments(attachments)
                            .with_parent(parent),
                    )
                    .await?;
                self.announce(&sibling);
                (sibling.clone(), vec![sibling])
            }
            _ => {
                let edited = self
                    .store
                    .update_message_content(&original.id, request.content, attachments)
                    .await?;
                for child in self.store.children(&edited.id).await? {
                    self.store.delete_subtree(&child.id).await?;
                }
                self.store
                    .set_active_leaf(&thread.id, LeafPointer::Message(edited.id.clone()))
                    .await?;
                self.sink.on_active_path_changed(&thread.id);
                (edited, Vec::new())
            }
        };
        self.set_state(&guard.ticket, TurnState::UserMessagePersisted);

        let turn = self
            .run_turn(&guard, &plan, message.id.clone(), persisted, started)
            .await?;
        Ok(EditOutcome {
            message,
            turn: Some(turn),
        })
    }

    /// Asks the model again.
    ///
    /// For a reply (or error note) the request is resent from its parent; with
    /// [`RegenerateMode::Replace`] the old reply and everything below it is deleted first. For a
    /// user message the new reply becomes another child of that message.
    pub async fn regenerate(
        &self,
        message_id: &MessageId,
        mode: RegenerateMode,
    ) -> Result<TurnResult, ChatError> {
        let message = self.store.get_message(message_id).await?;
        let start = match message.role {
            Role::Assistant => message.parent_id.clone().ok_or_else(|| {
                ChatError::invalid_request("a reply without a parent cannot be regenerated")
            })?,
            Role::User => message.id.clone(),
            role => {
                return Err(ChatError::invalid_request(format!(
                    "{} messages cannot be regenerated",
                    role.as_str()
                )));
            }
        };

        let thread = self.store.get_thread(&message.thread_id).await?;
        let plan = self.plan(&thread.settings)?;
        let started = Instant::now();
        let guard = self.begin_turn(&thread.id);

        if message.role == Role::Assistant && mode == RegenerateMode::Replace {
            self.store.delete_subtree(&message.id).await?;
        }
        self.store
            .set_active_leaf(&thread.id, LeafPointer::Message(start.clone()))
            .await?;
        self.sink.on_active_path_changed(&thread.id);

        self.run_turn(&guard, &plan, start, Vec::new(), started).await
    }

    fn read_catalog(&self) -> Result<RwLockReadGuard<'_, ModelCatalog>, ChatError> {
        self.catalog
            .read()
            .map_err(|_| ChatError::configuration("model catalog lock poisoned"))
    }

    fn plan(&self, settings: &ThreadSettings) -> Result<TurnPlan, ChatError> {
        let key = settings
            .model
            .clone()
            .or_else(|| self.policy.default_model.clone())
            .ok_or_else(|| ChatError::configuration("thread has no model selected"))?;

        let resolved = self
            .read_catalog()?
            .resolve(&key)
            .map_err(|error| ChatError::configuration(error.message))?;
        let provider = self.providers.get(&resolved.provider.id).ok_or_else(|| {
            ChatError::configuration(format!(
                "provider '{}' is not active",
                resolved.provider.id
            ))
        })?;
        if resolved.model.protocol == ProtocolKind::Responses && !provider.supports_responses() {
            return Err(ChatError::configuration(format!(
                "provider '{}' does not support the responses protocol",
                resolved.provider.id
            )));
        }

        let mut extra = resolved.model.extra_params.clone();
        extra.extend(settings.extra.clone());

        Ok(TurnPlan {
            system_prompt: settings
                .system_prompt
                .clone()
                .or_else(|| self.policy.system_prompt.clone()),
            context_window: settings.context_window.or(self.policy.context_window),
            max_tokens: settings
                .max_tokens
                .or(self.policy.max_tokens)
                .or(resolved.model.max_output_tokens),
            temperature: settings.temperature,
            extra,
            resolved,
            provider,
        })
    }

    fn begin_turn(&self, thread_id: &ThreadId) -> TurnGuard {
        TurnGuard {
            turns: Arc::clone(&self.in_flight),
            hooks: Arc::clone(&self.hooks),
            ticket: self.in_flight.begin(thread_id),
        }
    }

    fn set_state(&self, ticket: &TurnTicket, state: TurnState) {
        if self.in_flight.set_state(ticket, state) {
            tracing::debug!(
                event = "turn_state",
                thread_id = %ticket.thread_id,
                state = state.as_str(),
            );
            self.hooks.on_turn_state(&ticket.thread_id, state);
        }
    }

    fn announce(&self, message: &StoredMessage) {
        self.sink.on_message_persisted(message);
        self.sink.on_active_path_changed(&message.thread_id);
    }

    /// Stores `message` unless the turn was cancelled.
    async fn persist(
        &self,
        ticket: &TurnTicket,
        message: NewMessage,
        persisted: &mut Vec<StoredMessage>,
    ) -> Result<Option<StoredMessage>, ChatError> {
        if ticket.cancel.is_cancelled() {
            return Ok(None);
        }

        let stored = self.store.append_message(message).await?;
        self.announce(&stored);
        persisted.push(stored.clone());
        Ok(Some(stored))
    }

    /// The reply/tool loop, starting below `start`.
    async fn run_turn(
        &self,
        guard: &TurnGuard,
        plan: &TurnPlan,
        start: MessageId,
        mut persisted: Vec<StoredMessage>,
        started: Instant,
    ) -> Result<TurnResult, ChatError> {
        let ticket = &guard.ticket;
        let thread_id = ticket.thread_id.clone();
        let context = plan.tool_context(&thread_id);
        let capabilities = plan.resolved.model.capabilities;
        let mut parent = start;
        let mut rounds = 0u32;

        let outcome = 'turn: loop {
            if ticket.cancel.is_cancelled() {
                break TurnOutcome::Cancelled;
            }
            self.set_state(ticket, TurnState::AwaitingProviderReply);

            let path = self
                .store
                .get_active_path(&thread_id, Some(LeafPointer::Message(parent.clone())))
                .await?;
            let history = build_history(
                &path,
                plan.system_prompt.as_deref(),
                plan.context_window,
                capabilities.images,
            );
            let tools = if capabilities.tools {
                self.tools.definitions(&context).await
            } else {
                Vec::new()
            };

            let response = match self.request_reply(ticket, plan, history, tools).await {
                Ok(response) => response,
                Err(error) if error.is_cancelled() => break TurnOutcome::Cancelled,
                Err(error) => {
                    tracing::warn!(
                        event = "turn_failed",
                        thread_id = %thread_id,
                        error = %error,
                    );
                    let note = NewMessage::error_note(thread_id.clone(), error.to_note())
                        .with_parent(ParentSelector::Message(parent.clone()));
                    match self.persist(ticket, note, &mut persisted).await? {
                        Some(_) => break TurnOutcome::Failed(error),
                        None => break TurnOutcome::Cancelled,
                    }
                }
            };
            if ticket.cancel.is_cancelled() {
                break TurnOutcome::Cancelled;
            }

            let tool_calls = response.tool_calls();
            let usage = (!response.usage.is_empty()).then(|| UsageMetrics::from(response.usage));
            let reasoning = response.reasoning();

            if tool_calls.is_empty() {
                let (content, mut images) = extract_inline_images(&response.text());
                images.extend(response.images());
                let reply = NewMessage::assistant(thread_id.clone(), content)
                    .with_parent(ParentSelector::Message(parent.clone()))
                    .with_reasoning(reasoning)
                    .with_usage(usage)
                    .with_model(plan.model_label())
                    .with_images(images);
                match self.persist(ticket, reply, &mut persisted).await? {
                    Some(_) => break TurnOutcome::Completed,
                    None => break TurnOutcome::Cancelled,
                }
            }

            if let Some(limit) = self.policy.max_tool_rounds
                && rounds >= limit
            {
                let error = ChatError::tooling(format!(
                    "stopped after {limit} tool rounds without a final reply"
                ));
                let note = NewMessage::error_note(thread_id.clone(), error.to_note())
                    .with_parent(ParentSelector::Message(parent.clone()));
                match self.persist(ticket, note, &mut persisted).await? {
                    Some(_) => break TurnOutcome::Failed(error),
                    None => break TurnOutcome::Cancelled,
                }
            }

            rounds += 1;
            self.set_state(ticket, TurnState::ToolCallsPending);
            self.hooks.on_tool_round(&thread_id, rounds, tool_calls.len());

            let request_node = NewMessage::assistant(thread_id.clone(), response.text())
                .with_parent(ParentSelector::Message(parent.clone()))
                .with_tool_calls(tool_calls.clone())
                .with_reasoning(reasoning)
                .with_usage(usage)
                .with_model(plan.model_label());
            let Some(stored) = self.persist(ticket, request_node, &mut persisted).await? else {
                break TurnOutcome::Cancelled;
            };
            parent = stored.id;

            for call in &tool_calls {
                let Some(result) =
                    run_tool_call(self.tools.as_ref(), call, &context, &ticket.cancel).await
                else {
                    break 'turn TurnOutcome::Cancelled;
                };
                let node = NewMessage::tool_result(thread_id.clone(), call.id.clone(), result.output)
                    .with_parent(ParentSelector::Message(parent.clone()))
                    .with_ui_resource(result.ui_resource);
                let Some(stored) = self.persist(ticket, node, &mut persisted).await? else {
                    break 'turn TurnOutcome::Cancelled;
                };
                parent = stored.id;
            }
        };

        self.report(&thread_id, &outcome, &persisted, rounds, started);
        Ok(TurnResult {
            thread_id,
            created_thread: false,
            persisted,
            outcome,
        })
    }

    async fn request_reply(
        &self,
        ticket: &TurnTicket,
        plan: &TurnPlan,
        history: Vec<tprovider::Message>,
        tools: Vec<tprovider::ToolDefinition>,
    ) -> Result<ModelResponse, ChatError> {
        let model = &plan.resolved.model;
        let streaming = self.policy.streaming && model.capabilities.streaming;

        let mut builder = ModelRequest::builder(model.model_id.clone())
            .messages(history)
            .tools(tools)
            .extra(plan.extra.clone())
            .streaming(streaming);
        if let Some(temperature) = plan.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = plan.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        let request = builder
            .build()
            .map_err(|error| ChatError::from(error).with_phase(ChatErrorPhase::RequestBuild))?;

        let prepared = match model.protocol {
            ProtocolKind::ChatCompletions => PreparedRequest::Chat(request),
            ProtocolKind::Responses => {
                let request = ResponseRequest::from(request);
                request.validate().map_err(|error| {
                    ChatError::from(error).with_phase(ChatErrorPhase::RequestBuild)
                })?;
                PreparedRequest::Responses(request)
            }
        };

        let provider = plan.provider.as_ref();
        let kind = plan.resolved.provider.kind;
        let prepared = &prepared;
        with_retry(
            &plan.resolved.provider.id,
            prepared.operation(streaming),
            &self.retry_policies,
            self.provider_hooks.as_ref(),
            &ticket.cancel,
            |attempt| async move {
                if !streaming {
                    return prepared.complete(provider).await;
                }
                if attempt > 1 {
                    self.sink.on_stream_reset(&ticket.thread_id);
                }
                let stream = prepared.open_stream(provider).await?;
                self.drain_stream(ticket, stream, kind, &model.model_id).await
            },
        )
        .await
        .map_err(ChatError::from)
    }

    async fn drain_stream(
        &self,
        ticket: &TurnTicket,
        mut stream: BoxedEventStream<'_>,
        kind: ProviderKind,
        model_id: &str,
    ) -> Result<ModelResponse, ProviderError> {
        self.set_state(ticket, TurnState::StreamingReply);
        let mut accumulator = StreamAccumulator::default();
        while let Some(event) = stream.next().await {
            let event = event?;
            match &event {
                StreamEvent::TextDelta(delta) => self.sink.on_text_delta(&ticket.thread_id, delta),
                StreamEvent::ReasoningDelta(delta) => {
                    self.sink.on_reasoning_delta(&ticket.thread_id, delta)
                }
                _ => {}
            }
            accumulator.apply(&event);
        }
        Ok(accumulator.finish(kind, model_id))
    }

    fn report(
        &self,
        thread_id: &ThreadId,
        outcome: &TurnOutcome,
        persisted: &[StoredMessage],
        rounds: u32,
        started: Instant,
    ) {
        let elapsed = started.elapsed();
        match outcome {
            TurnOutcome::Completed => {
                tracing::info!(
                    event = "turn_completed",
                    thread_id = %thread_id,
                    tool_rounds = rounds,
                    elapsed_ms = elapsed.as_millis() as u64,
                );
                if let Some(reply) = persisted.last() {
                    self.hooks.on_turn_completed(thread_id, reply, elapsed);
                }
            }
            TurnOutcome::Failed(error) => self.hooks.on_turn_failed(thread_id, error, elapsed),
            TurnOutcome::Cancelled => {
                tracing::info!(event = "turn_cancelled", thread_id = %thread_id);
                self.hooks.on_turn_cancelled(thread_id, elapsed);
            }
        }
    }

    fn spawn_title(&self, thread_id: &ThreadId, plan: &TurnPlan, user_text: String, reply_text: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(event = "title_skipped", thread_id = %thread_id, reason = "no runtime");
            return;
        };

        let request = TitleRequest {
            thread_id: thread_id.clone(),
            provider: Arc::clone(&plan.provider),
            model_id: plan.resolved.model.model_id.clone(),
            user_text,
            reply_text,
        };
        let store = self.store.clone();
        let titles = Arc::clone(&self.titles);
        let hooks = Arc::clone(&self.hooks);
        let thread_id = thread_id.clone();

        runtime.spawn(async move {
            let title = match titles.generate_title(request).await {
                Ok(title) => title,
                Err(error) => {
                    tracing::warn!(event = "title_failed", thread_id = %thread_id, error = %error);
                    return;
                }
            };
            match store.rename_thread(&thread_id, title.clone()).await {
                Ok(_) => hooks.on_title_generated(&thread_id, &title),
                Err(error) => {
                    tracing::warn!(event = "title_failed", thread_id = %thread_id, error = %error)
                }
            }
        });
    }
}

fn merge_attachments(
    existing: &[Attachment],
    removed_ids: &[String],
    added: Vec<Attachment>,
) -> Vec<Attachment> {
    existing
        .iter()
        .filter(|attachment| !removed_ids.contains(&attachment.id))
        .cloned()
        .chain(added)
        .collect()
}
