//! Tool runtime trait and default registry-backed executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_timer::Delay;
use futures_util::future::{Either, select};
use futures_util::pin_mut;
use tprovider::{ToolCall, ToolDefinition};

use crate::{
    NoopToolRuntimeHooks, ToolError, ToolExecutionContext, ToolExecutionResult, ToolFuture,
    ToolRegistry, ToolRuntimeHooks,
};

/// What the conversation loop needs from a tool layer: schemas to advertise and a way to run
/// a requested call.
pub trait ToolRuntime: Send + Sync {
    fn definitions<'a>(
        &'a self,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Vec<ToolDefinition>>;

    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>>;
}

#[derive(Clone)]
pub struct DefaultToolRuntime {
    registry: Arc<ToolRegistry>,
    hooks: Arc<dyn ToolRuntimeHooks>,
    timeout: Option<Duration>,
}

impl Default for DefaultToolRuntime {
    fn default() -> Self {
        Self::new(Arc::new(ToolRegistry::new()))
    }
}

impl DefaultToolRuntime {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            hooks: Arc::new(NoopToolRuntimeHooks),
            timeout: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Fails any single local invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn handles(&self, name: &str) -> bool {
        self.registry.get(name).is_some()
    }

    async fn invoke(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
    ) -> Result<ToolExecutionResult, ToolError> {
        let tool = self.registry.get(&tool_call.name).ok_or_else(|| {
            ToolError::not_found(format!("tool '{}' is not registered", tool_call.name))
        })?;

        let invocation = tool.invoke(&tool_call.arguments, context);
        let output = match self.timeout {
            None => invocation.await?,
            Some(limit) => {
                let delay = Delay::new(limit);
                pin_mut!(invocation);
                pin_mut!(delay);
                match select(invocation, delay).await {
                    Either::Left((output, _)) => output?,
                    Either::Right(((), _)) => {
                        return Err(ToolError::timeout(format!(
                            "tool '{}' timed out after {}ms",
                            tool_call.name,
                            limit.as_millis()
                        )));
                    }
                }
            }
        };

        Ok(ToolExecutionResult::from_call(tool_call, output))
    }
}

impl ToolRuntime for DefaultToolRuntime {
    fn definitions<'a>(
        &'a self,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Vec<ToolDefinition>> {
        Box::pin(async move { self.registry.definitions() })
    }

    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(async move {
            self.hooks.on_execution_start(&tool_call, &context);
            let started = Instant::now();

            match self.invoke(&tool_call, &context).await {
                Ok(result) => {
                    self.hooks
                        .on_execution_success(&tool_call, &context, &result, started.elapsed());
                    Ok(result)
                }
                Err(error) => {
                    let error = error
                        .with_tool_name(tool_call.name.clone())
                        .with_tool_call_id(tool_call.id.clone());
                    self.hooks
                        .on_execution_failure(&tool_call, &context, &error, started.elapsed());
                    Err(error)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{Tool, ToolErrorKind};

    #[derive(Debug)]
    struct EchoTool;

    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("echo", "Echoes arguments", r#"{"type":"object"}"#)
        }

        fn invoke<'a>(
            &'a self,
            args_json: &'a str,
            context: &'a ToolExecutionContext,
        ) -> ToolFuture<'a, Result<String, ToolError>> {
            Box::pin(async move {
                let thread = context
                    .thread_id
                    .as_ref()
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_default();
                Ok(format!("thread={thread} args={args_json}"))
            })
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl ToolRuntimeHooks for RecordingHooks {
        fn on_execution_start(&self, tool_call: &ToolCall, _context: &ToolExecutionContext) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("start:{}", tool_call.name));
        }

        fn on_execution_failure(
            &self,
            _tool_call: &ToolCall,
            _context: &ToolExecutionContext,
            error: &ToolError,
            _elapsed: Duration,
        ) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("failure:{:?}", error.kind));
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn runtime_executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let runtime = DefaultToolRuntime::new(Arc::new(registry));

        let result = runtime
            .execute(
                call("call_1", "echo", "{\"x\":1}"),
                ToolExecutionContext::for_thread("thread-1"),
            )
            .await
            .expect("execution should succeed");

        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.output, "thread=thread-1 args={\"x\":1}");
        assert!(result.ui_resource.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found_and_reported_to_hooks() {
        let hooks = Arc::new(RecordingHooks::default());
        let runtime = DefaultToolRuntime::default().with_hooks(hooks.clone());

        let error = runtime
            .execute(call("call_2", "missing", "{}"), ToolExecutionContext::new())
            .await
            .expect_err("execution should fail");

        assert_eq!(error.kind, ToolErrorKind::NotFound);
        assert_eq!(error.tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(
            *hooks.events.lock().expect("events lock"),
            vec!["start:missing".to_string(), "failure:NotFound".to_string()]
        );
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::function("slow", "Never finishes", "{}"),
            |_, _| async move {
                futures_util::future::pending::<()>().await;
                Ok(String::new())
            },
        );
        let runtime =
            DefaultToolRuntime::new(Arc::new(registry)).with_timeout(Duration::from_millis(20));

        let error = runtime
            .execute(call("call_3", "slow", "{}"), ToolExecutionContext::new())
            .await
            .expect_err("should time out");

        assert_eq!(error.kind, ToolErrorKind::Timeout);
    }
}
