//! Wires a tree store, providers, tools and observability into one conversation service.

use std::sync::Arc;
use std::time::Duration;

use tobserve::{
    MetricsObservabilityHooks, SafeConversationHooks, SafeProviderHooks, SafeToolHooks,
    TracingObservabilityHooks,
};

use crate::providers::build_registry;
use crate::{
    ChatError, ChatPolicy, ConversationHooks, ConversationService, HttpServerConnector,
    MessageTreeStore, ModelCatalog, ModelConfig, ModelProvider, ProviderConfig,
    ProviderOperationHooks, ProviderRegistry, RemoteToolManager, RemoteToolServerConfig,
    RetryPolicies, SecureCredentialManager, ToolGateway, ToolRegistry, ToolRuntime,
    ToolRuntimeHooks, TreeBackendConfig, create_tree_backend,
};

/// Which hook set is attached to providers, tools and turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservabilityMode {
    Off,
    #[default]
    Tracing,
    Metrics,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub store: TreeBackendConfig,
    pub catalog: ModelCatalog,
    pub remote_servers: Vec<RemoteToolServerConfig>,
    pub policy: ChatPolicy,
    pub retry_policies: RetryPolicies,
    /// Applies to provider HTTP clients and remote tool servers alike.
    pub request_timeout: Duration,
    pub tool_timeout: Duration,
    pub observability: ObservabilityMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store: TreeBackendConfig::default(),
            catalog: ModelCatalog::new(),
            remote_servers: Vec::new(),
            policy: ChatPolicy::default(),
            retry_policies: RetryPolicies::default(),
            request_timeout: Duration::from_secs(90),
            tool_timeout: Duration::from_secs(60),
            observability: ObservabilityMode::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn in_memory() -> Self {
        Self {
            store: TreeBackendConfig::InMemory,
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: TreeBackendConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_remote_server(mut self, server: RemoteToolServerConfig) -> Self {
        self.remote_servers.push(server);
        self
    }

    pub fn with_policy(mut self, policy: ChatPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_policies(mut self, retry_policies: RetryPolicies) -> Self {
        self.retry_policies = retry_policies;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityMode) -> Self {
        self.observability = observability;
        self
    }
}

/// Everything a front end needs after startup.
#[derive(Clone)]
pub struct RuntimeBundle {
    pub service: ConversationService,
    pub store: MessageTreeStore,
    pub gateway: Arc<ToolGateway>,
    pub providers: ProviderRegistry,
    pub credentials: Arc<SecureCredentialManager>,
}

impl RuntimeBundle {
    pub fn catalog(&self) -> Result<ModelCatalog, ChatError> {
        self.service.catalog()
    }
}

struct Hooks {
    provider: Option<Arc<dyn ProviderOperationHooks>>,
    tool: Option<Arc<dyn ToolRuntimeHooks>>,
    conversation: Option<Arc<dyn ConversationHooks>>,
}

impl Hooks {
    fn for_mode(mode: ObservabilityMode) -> Self {
        match mode {
            ObservabilityMode::Off => Self {
                provider: None,
                tool: None,
                conversation: None,
            },
            ObservabilityMode::Tracing => Self::observed(TracingObservabilityHooks),
            ObservabilityMode::Metrics => Self::observed(MetricsObservabilityHooks),
        }
    }

    fn observed<H>(hooks: H) -> Self
    where
        H: ProviderOperationHooks + ToolRuntimeHooks + ConversationHooks + Copy + 'static,
    {
        let provider: Arc<dyn ProviderOperationHooks> = Arc::new(SafeProviderHooks::new(hooks));
        let tool: Arc<dyn ToolRuntimeHooks> = Arc::new(SafeToolHooks::new(hooks));
        let conversation: Arc<dyn ConversationHooks> = Arc::new(SafeConversationHooks::new(hooks));
        Self {
            provider: Some(provider),
            tool: Some(tool),
            conversation: Some(conversation),
        }
    }
}

pub fn build_runtime(config: RuntimeConfig) -> Result<RuntimeBundle, ChatError> {
    build_runtime_with_tools(config, Arc::new(ToolRegistry::new()))
}

/// Same as [`build_runtime`] with locally registered tools offered next to remote ones.
pub fn build_runtime_with_tools(
    config: RuntimeConfig,
    tools: Arc<ToolRegistry>,
) -> Result<RuntimeBundle, ChatError> {
    let RuntimeConfig {
        store,
        catalog,
        remote_servers,
        policy,
        retry_policies,
        request_timeout,
        tool_timeout,
        observability,
    } = config;

    let store = MessageTreeStore::new(create_tree_backend(store)?);
    let credentials = Arc::new(SecureCredentialManager::new());
    let providers = build_registry(&catalog, Arc::clone(&credentials), request_timeout);
    let hooks = Hooks::for_mode(observability);

    let mut gateway = ToolGateway::new(tools).with_timeout(tool_timeout);
    if let Some(tool_hooks) = hooks.tool {
        gateway = gateway.with_hooks(tool_hooks);
    }
    if !remote_servers.is_empty() {
        let connector = Arc::new(HttpServerConnector::with_timeout(request_timeout)?);
        gateway = gateway.with_remote(Arc::new(RemoteToolManager::with_servers(
            connector,
            remote_servers,
        )));
    }
    let gateway = Arc::new(gateway);

    let tool_runtime: Arc<dyn ToolRuntime> = gateway.clone();
    let mut builder = ConversationService::builder(store.clone())
        .catalog(catalog)
        .providers(providers.clone())
        .tools(tool_runtime)
        .policy(policy)
        .retry_policies(retry_policies);
    if let Some(provider_hooks) = hooks.provider {
        builder = builder.provider_hooks(provider_hooks);
    }
    if let Some(conversation_hooks) = hooks.conversation {
        builder = builder.hooks(conversation_hooks);
    }

    tracing::info!(
        event = "runtime_ready",
        providers = providers.len(),
        observability = ?observability,
    );

    Ok(RuntimeBundle {
        service: builder.build(),
        store,
        gateway,
        providers,
        credentials,
    })
}

/// An in-memory service around one already-built provider, mostly for tests and demos.
pub fn in_memory_service(
    provider_id: &str,
    provider: Arc<dyn ModelProvider>,
    model_id: &str,
) -> ConversationService {
    let model = ModelConfig::new(provider_id, model_id);
    let catalog = ModelCatalog::new()
        .with_provider(ProviderConfig::new(provider_id, provider.kind()))
        .with_model(model.clone());
    let mut providers = ProviderRegistry::new();
    providers.register_shared(provider_id, provider);

    ConversationService::builder(MessageTreeStore::in_memory())
        .catalog(catalog)
        .providers(providers)
        .policy(ChatPolicy::default().with_default_model(model.key()))
        .build()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        BoxedEventStream, ChatErrorKind, Message, ModelCatalog, ModelConfig, ModelKey,
        ModelProvider, ModelRequest, ModelResponse, OutputItem, ProviderConfig, ProviderError,
        ProviderFuture, ProviderKind, Role, SendRequest, StopReason, StreamEvent, TokenUsage,
        ToolDefinition, ToolExecutionContext, ToolRegistry, ToolRuntime, VecEventStream,
    };

    use super::{
        ObservabilityMode, RuntimeConfig, build_runtime, build_runtime_with_tools,
        in_memory_service,
    };

    struct FakeProvider;

    impl ModelProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAiCompatible
        }

        fn complete<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
            Box::pin(async move {
                Ok(ModelResponse {
                    provider: ProviderKind::OpenAiCompatible,
                    model: request.model,
                    output: vec![OutputItem::Message(Message::new(Role::Assistant, "done"))],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::new(3, 1),
                })
            })
        }

        fn stream<'a>(
            &'a self,
            _request: ModelRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async move {
                let stream = VecEventStream::new(vec![
                    Ok(StreamEvent::TextDelta("done".to_string())),
                    Ok(StreamEvent::Usage(TokenUsage::new(3, 1))),
                    Ok(StreamEvent::Finished(StopReason::EndTurn)),
                ]);
                Ok(Box::pin(stream) as BoxedEventStream<'a>)
            })
        }
    }

    #[tokio::test]
    async fn in_memory_service_answers_a_first_message() {
        let service = in_memory_service("fake", Arc::new(FakeProvider), "m1");

        let result = service
            .send(SendRequest::new("hello"))
            .await
            .expect("turn completes");
        assert!(result.created_thread);

        let path = service
            .active_path(&result.thread_id)
            .await
            .expect("active path");
        let contents: Vec<&str> = path.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "done"]);
        assert_eq!(path[1].model.as_deref(), Some("fake/m1"));
    }

    #[tokio::test]
    async fn runtime_builds_anonymous_providers_and_skips_keyless_ones() {
        let catalog = ModelCatalog::new()
            .with_provider(ProviderConfig::new("local", ProviderKind::Ollama))
            .with_provider(ProviderConfig::new("anthropic", ProviderKind::Anthropic))
            .with_model(ModelConfig::new("local", "llama3"))
            .with_model(ModelConfig::new("anthropic", "claude"));
        let config = RuntimeConfig::in_memory()
            .with_catalog(catalog)
            .with_observability(ObservabilityMode::Metrics);

        let runtime = build_runtime(config).expect("runtime builds");
        assert_eq!(runtime.providers.ids(), vec!["local".to_string()]);
        assert_eq!(runtime.catalog().expect("catalog").models().len(), 2);

        let error = runtime
            .service
            .send(SendRequest::new("hi").with_model(ModelKey::new("anthropic", "claude")))
            .await
            .err()
            .expect("inactive provider");
        assert_eq!(error.kind, ChatErrorKind::Configuration);
        assert!(
            runtime
                .store
                .list_threads()
                .await
                .expect("threads")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn local_tools_are_offered_through_the_gateway() {
        let mut registry = ToolRegistry::new();
        registry.register_sync_fn(
            ToolDefinition::function("echo", "Echo the input", r#"{"type":"object"}"#),
            |arguments, _context| Ok(arguments),
        );

        let runtime = build_runtime_with_tools(
            RuntimeConfig::in_memory().with_observability(ObservabilityMode::Off),
            Arc::new(registry),
        )
        .expect("runtime builds");

        let context = ToolExecutionContext::for_thread("thread-1");
        let names: Vec<String> = runtime
            .gateway
            .definitions(&context)
            .await
            .into_iter()
            .map(|definition| definition.name)
            .collect();
        assert_eq!(names, vec!["echo".to_string()]);
    }
}
