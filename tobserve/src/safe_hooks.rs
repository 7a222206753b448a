use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tchat::{ChatError, ConversationHooks, TurnState};
use tcommon::ThreadId;
use tprovider::{ProviderError, ProviderOperationHooks, ToolCall};
use ttooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};
use ttree::StoredMessage;

/// Runs `hook`, discarding any panic it raises.
fn guarded(hook: impl FnOnce()) {
    let _ = catch_unwind(AssertUnwindSafe(hook));
}

pub struct SafeProviderHooks<H> {
    inner: H,
}

impl<H> SafeProviderHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ProviderOperationHooks for SafeProviderHooks<H>
where
    H: ProviderOperationHooks,
{
    fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
        guarded(|| self.inner.on_attempt_start(provider, operation, attempt));
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        guarded(|| {
            self.inner
                .on_retry_scheduled(provider, operation, attempt, delay, error)
        });
    }

    fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
        guarded(|| self.inner.on_success(provider, operation, attempts));
    }

    fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &ProviderError) {
        guarded(|| self.inner.on_failure(provider, operation, attempts, error));
    }

    fn on_cancelled(&self, provider: &str, operation: &str, attempts: u32) {
        guarded(|| self.inner.on_cancelled(provider, operation, attempts));
    }
}

pub struct SafeToolHooks<H> {
    inner: H,
}

impl<H> SafeToolHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ToolRuntimeHooks for SafeToolHooks<H>
where
    H: ToolRuntimeHooks,
{
    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        guarded(|| self.inner.on_execution_start(tool_call, context));
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        guarded(|| {
            self.inner
                .on_execution_success(tool_call, context, result, elapsed)
        });
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        guarded(|| {
            self.inner
                .on_execution_failure(tool_call, context, error, elapsed)
        });
    }

    fn on_remote_server_error(&self, server_id: &str, error: &ToolError) {
        guarded(|| self.inner.on_remote_server_error(server_id, error));
    }
}

pub struct SafeConversationHooks<H> {
    inner: H,
}

impl<H> SafeConversationHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ConversationHooks for SafeConversationHooks<H>
where
    H: ConversationHooks,
{
    fn on_turn_state(&self, thread_id: &ThreadId, state: TurnState) {
        guarded(|| self.inner.on_turn_state(thread_id, state));
    }

    fn on_tool_round(&self, thread_id: &ThreadId, round: u32, calls: usize) {
        guarded(|| self.inner.on_tool_round(thread_id, round, calls));
    }

    fn on_turn_completed(&self, thread_id: &ThreadId, reply: &StoredMessage, elapsed: Duration) {
        guarded(|| self.inner.on_turn_completed(thread_id, reply, elapsed));
    }

    fn on_turn_failed(&self, thread_id: &ThreadId, error: &ChatError, elapsed: Duration) {
        guarded(|| self.inner.on_turn_failed(thread_id, error, elapsed));
    }

    fn on_turn_cancelled(&self, thread_id: &ThreadId, elapsed: Duration) {
        guarded(|| self.inner.on_turn_cancelled(thread_id, elapsed));
    }

    fn on_title_generated(&self, thread_id: &ThreadId, title: &str) {
        guarded(|| self.inner.on_title_generated(thread_id, title));
    }
}
