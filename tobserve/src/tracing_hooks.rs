//! Structured tracing events for provider attempts, tool execution and conversation turns.
//!
//! ```rust
//! use tchat::ConversationHooks;
//! use tobserve::TracingObservabilityHooks;
//!
//! fn accepts_turn_hooks(_hooks: &dyn ConversationHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_turn_hooks(&hooks);
//! ```

use std::time::Duration;

use tchat::{ChatError, ConversationHooks, TurnState};
use tcommon::ThreadId;
use tprovider::{ProviderError, ProviderOperationHooks, ToolCall};
use ttooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};
use ttree::StoredMessage;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

fn thread_of(context: &ToolExecutionContext) -> Option<&str> {
    context.thread_id.as_ref().map(ThreadId::as_str)
}

impl ProviderOperationHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
        tracing::info!(
            phase = "provider",
            event = "attempt_start",
            provider,
            operation,
            attempt
        );
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        tracing::warn!(
            phase = "provider",
            event = "retry_scheduled",
            provider,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        tracing::info!(
            phase = "provider",
            event = "success",
            provider,
            operation,
            attempts
        );
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &ProviderError) {
        tracing::error!(
            phase = "provider",
            event = "failure",
            provider,
            operation,
            attempts,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_cancelled(&self, provider: &str, operation: &str, attempts: u32) {
        tracing::info!(
            phase = "provider",
            event = "cancelled",
            provider,
            operation,
            attempts
        );
    }
}

impl ToolRuntimeHooks for TracingObservabilityHooks {
    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        tracing::info!(
            phase = "tool",
            event = "execution_start",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            thread_id = thread_of(context)
        );
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        tracing::info!(
            phase = "tool",
            event = "execution_success",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            thread_id = thread_of(context),
            has_ui = result.ui_resource.is_some(),
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        tracing::error!(
            phase = "tool",
            event = "execution_failure",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            thread_id = thread_of(context),
            elapsed_ms = elapsed.as_millis() as u64,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_remote_server_error(&self, server_id: &str, error: &ToolError) {
        tracing::warn!(
            phase = "tool",
            event = "remote_server_error",
            server_id,
            error_kind = ?error.kind,
            error = %error
        );
    }
}

impl ConversationHooks for TracingObservabilityHooks {
    fn on_turn_state(&self, thread_id: &ThreadId, state: TurnState) {
        tracing::debug!(
            phase = "turn",
            event = "state",
            thread_id = %thread_id,
            state = state.as_str()
        );
    }

    fn on_tool_round(&self, thread_id: &ThreadId, round: u32, calls: usize) {
        tracing::info!(
            phase = "turn",
            event = "tool_round",
            thread_id = %thread_id,
            round,
            calls
        );
    }

    fn on_turn_completed(&self, thread_id: &ThreadId, reply: &StoredMessage, elapsed: Duration) {
        tracing::info!(
            phase = "turn",
            event = "completed",
            thread_id = %thread_id,
            message_id = %reply.id,
            model = reply.model.as_deref(),
            output_tokens = reply.usage.map(|usage| usage.output_tokens),
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_turn_failed(&self, thread_id: &ThreadId, error: &ChatError, elapsed: Duration) {
        tracing::error!(
            phase = "turn",
            event = "failed",
            thread_id = %thread_id,
            error_kind = ?error.kind,
            error_phase = ?error.phase,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %error
        );
    }

    fn on_turn_cancelled(&self, thread_id: &ThreadId, elapsed: Duration) {
        tracing::info!(
            phase = "turn",
            event = "cancelled",
            thread_id = %thread_id,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_title_generated(&self, thread_id: &ThreadId, title: &str) {
        tracing::info!(phase = "turn", event = "title_generated", thread_id = %thread_id, title);
    }
}
