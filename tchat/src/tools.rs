//! Tool-call execution for one round of the turn loop.

use tokio_util::sync::CancellationToken;
use tprovider::{ToolCall, cancellable};
use ttooling::{ToolExecutionContext, ToolExecutionResult, ToolRuntime};

/// Runs one requested call. Failures become `"Error: ..."` output so the loop can continue.
///
/// Returns `None` when `cancel` fires before the tool finishes.
pub(crate) async fn run_tool_call(
    runtime: &dyn ToolRuntime,
    call: &ToolCall,
    context: &ToolExecutionContext,
    cancel: &CancellationToken,
) -> Option<ToolExecutionResult> {
    let execution = runtime.execute(call.clone(), context.clone());
    match cancellable(cancel, execution).await? {
        Ok(result) => Some(result),
        Err(error) => {
            tracing::warn!(
                event = "tool_call_failed",
                tool = %call.name,
                call_id = %call.id,
                error = %error,
            );
            Some(ToolExecutionResult::from_call(call, error.to_tool_output()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tprovider::ToolDefinition;
    use ttooling::{DefaultToolRuntime, ToolError, ToolRegistry};

    use super::*;

    fn runtime() -> DefaultToolRuntime {
        let mut registry = ToolRegistry::new();
        registry.register_sync_fn(
            ToolDefinition::function(
                "echo",
                "Echo the text argument",
                r#"{"type":"object","properties":{"text":{"type":"string"}}}"#,
            ),
            |arguments, _context| {
                let value: serde_json::Value = serde_json::from_str(&arguments)
                    .map_err(|error| ToolError::invalid_arguments(error.to_string()))?;
                Ok(value["text"].as_str().unwrap_or_default().to_string())
            },
        );
        DefaultToolRuntime::new(Arc::new(registry))
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn successful_calls_return_tool_output() {
        let result = run_tool_call(
            &runtime(),
            &call("echo", r#"{"text":"hi"}"#),
            &ToolExecutionContext::new(),
            &CancellationToken::new(),
        )
        .await
        .expect("not cancelled");
        assert_eq!(result.output, "hi");
        assert_eq!(result.tool_call_id, "call-echo");
    }

    #[tokio::test]
    async fn failures_become_error_content() {
        let result = run_tool_call(
            &runtime(),
            &call("missing", "{}"),
            &ToolExecutionContext::new(),
            &CancellationToken::new(),
        )
        .await
        .expect("not cancelled");
        assert!(result.output.starts_with("Error: "));
        assert_eq!(result.tool_call_id, "call-missing");
    }

    #[tokio::test]
    async fn cancelled_token_skips_execution() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_tool_call(
            &runtime(),
            &call("echo", r#"{"text":"hi"}"#),
            &ToolExecutionContext::new(),
            &cancel,
        )
        .await;
        assert!(result.is_none());
    }
}
