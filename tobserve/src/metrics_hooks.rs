//! Metrics for provider attempts, tool execution and conversation turns.
//!
//! ```rust
//! use tobserve::MetricsObservabilityHooks;
//! use tprovider::ProviderOperationHooks;
//!
//! fn accepts_provider_hooks(_hooks: &dyn ProviderOperationHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_provider_hooks(&hooks);
//! ```

use std::time::Duration;

use tchat::{ChatError, ConversationHooks, TurnState};
use tcommon::ThreadId;
use tprovider::{ProviderError, ProviderOperationHooks, ToolCall};
use ttooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};
use ttree::StoredMessage;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl ProviderOperationHooks for MetricsObservabilityHooks {
    fn on_attempt_start(&self, provider: &str, operation: &str, _attempt: u32) {
        metrics::counter!(
            "trellis_provider_attempt_start_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        _attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        metrics::counter!(
            "trellis_provider_retry_scheduled_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "trellis_provider_retry_delay_seconds",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        metrics::counter!(
            "trellis_provider_success_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "trellis_provider_attempts_per_success",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(attempts as f64);
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &ProviderError) {
        metrics::counter!(
            "trellis_provider_failure_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "trellis_provider_attempts_per_failure",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(attempts as f64);
    }

    fn on_cancelled(&self, provider: &str, operation: &str, _attempts: u32) {
        metrics::counter!(
            "trellis_provider_cancelled_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

impl ToolRuntimeHooks for MetricsObservabilityHooks {
    fn on_execution_start(&self, tool_call: &ToolCall, _context: &ToolExecutionContext) {
        metrics::counter!(
            "trellis_tool_execution_start_total",
            "tool_name" => tool_call.name.clone()
        )
        .increment(1);
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "trellis_tool_execution_success_total",
            "tool_name" => tool_call.name.clone()
        )
        .increment(1);
        metrics::histogram!(
            "trellis_tool_execution_duration_seconds",
            "tool_name" => tool_call.name.clone(),
            "status" => "success"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "trellis_tool_execution_failure_total",
            "tool_name" => tool_call.name.clone(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "trellis_tool_execution_duration_seconds",
            "tool_name" => tool_call.name.clone(),
            "status" => "failure"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_remote_server_error(&self, server_id: &str, error: &ToolError) {
        metrics::counter!(
            "trellis_remote_server_error_total",
            "server_id" => server_id.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }
}

impl ConversationHooks for MetricsObservabilityHooks {
    fn on_turn_state(&self, _thread_id: &ThreadId, state: TurnState) {
        metrics::counter!("trellis_turn_state_total", "state" => state.as_str()).increment(1);
    }

    fn on_tool_round(&self, _thread_id: &ThreadId, _round: u32, calls: usize) {
        metrics::counter!("trellis_tool_rounds_total").increment(1);
        metrics::histogram!("trellis_tool_calls_per_round").record(calls as f64);
    }

    fn on_turn_completed(&self, _thread_id: &ThreadId, reply: &StoredMessage, elapsed: Duration) {
        let model = reply.model.clone().unwrap_or_default();
        metrics::counter!("trellis_turn_completed_total", "model" => model.clone()).increment(1);
        metrics::histogram!(
            "trellis_turn_duration_seconds",
            "model" => model.clone(),
            "status" => "completed"
        )
        .record(elapsed.as_secs_f64());
        if let Some(usage) = reply.usage {
            metrics::counter!("trellis_turn_output_tokens_total", "model" => model)
                .increment(u64::from(usage.output_tokens));
        }
    }

    fn on_turn_failed(&self, _thread_id: &ThreadId, error: &ChatError, elapsed: Duration) {
        metrics::counter!(
            "trellis_turn_failed_total",
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!("trellis_turn_duration_seconds", "status" => "failed")
            .record(elapsed.as_secs_f64());
    }

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, elapsed: Duration) {
        metrics::counter!("trellis_turn_cancelled_total").increment(1);
        metrics::histogram!("trellis_turn_duration_seconds", "status" => "cancelled")
            .record(elapsed.as_secs_f64());
    }

    fn on_title_generated(&self, _thread_id: &ThreadId, _title: &str) {
        metrics::counter!("trellis_thread_titles_generated_total").increment(1);
    }
}
