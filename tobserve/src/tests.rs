use std::sync::{Arc, Mutex};
use std::time::Duration;

use tchat::{ChatError, ConversationHooks, TurnState};
use tcommon::ThreadId;
use tprovider::{ProviderError, ProviderOperationHooks, Role, ToolCall};
use ttooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};
use ttree::{NewMessage, StoredMessage};

use crate::{
    MetricsObservabilityHooks, SafeConversationHooks, SafeProviderHooks, SafeToolHooks,
    TracingObservabilityHooks,
};

fn sample_tool_call() -> ToolCall {
    ToolCall {
        id: "call-1".to_string(),
        name: "echo".to_string(),
        arguments: "{}".to_string(),
    }
}

fn sample_tool_context() -> ToolExecutionContext {
    ToolExecutionContext::for_thread("thread-1")
}

fn sample_reply() -> StoredMessage {
    let message = NewMessage::assistant("thread-1", "hi").with_model("fake/m1");
    StoredMessage {
        id: "message-1".into(),
        thread_id: message.thread_id,
        parent_id: None,
        role: Role::Assistant,
        content: message.content,
        tool_calls: Vec::new(),
        tool_call_id: None,
        reasoning: None,
        usage: None,
        model: message.model,
        attachments: Vec::new(),
        images: Vec::new(),
        origin: message.origin,
        ui_resource: None,
        created_at: std::time::SystemTime::UNIX_EPOCH,
        sequence: 1,
    }
}

fn exercise_provider_hooks(hooks: &dyn ProviderOperationHooks) {
    let provider_error = ProviderError::timeout("provider timeout");
    hooks.on_attempt_start("openai", "complete", 1);
    hooks.on_retry_scheduled(
        "openai",
        "complete",
        1,
        Duration::from_millis(10),
        &provider_error,
    );
    hooks.on_success("openai", "complete", 2);
    hooks.on_failure("openai", "complete", 2, &provider_error);
    hooks.on_cancelled("openai", "stream", 1);
}

fn exercise_tool_hooks(hooks: &dyn ToolRuntimeHooks) {
    let tool_error = ToolError::execution("tool failed");
    hooks.on_execution_start(&sample_tool_call(), &sample_tool_context());
    hooks.on_execution_success(
        &sample_tool_call(),
        &sample_tool_context(),
        &ToolExecutionResult::new("call-1", "ok"),
        Duration::from_millis(20),
    );
    hooks.on_execution_failure(
        &sample_tool_call(),
        &sample_tool_context(),
        &tool_error,
        Duration::from_millis(20),
    );
    hooks.on_remote_server_error("docs", &ToolError::unavailable("connection refused"));
}

fn exercise_conversation_hooks(hooks: &dyn ConversationHooks) {
    let thread_id = ThreadId::new("thread-1");
    hooks.on_turn_state(&thread_id, TurnState::AwaitingProviderReply);
    hooks.on_tool_round(&thread_id, 1, 2);
    hooks.on_turn_completed(&thread_id, &sample_reply(), Duration::from_millis(30));
    hooks.on_turn_failed(
        &thread_id,
        &ChatError::provider("upstream down"),
        Duration::from_millis(30),
    );
    hooks.on_turn_cancelled(&thread_id, Duration::from_millis(5));
    hooks.on_title_generated(&thread_id, "Greetings");
}

#[test]
fn tracing_hooks_smoke_test_all_callbacks() {
    let hooks = TracingObservabilityHooks;
    exercise_provider_hooks(&hooks);
    exercise_tool_hooks(&hooks);
    exercise_conversation_hooks(&hooks);
}

#[test]
fn metrics_hooks_smoke_test_all_callbacks() {
    let hooks = MetricsObservabilityHooks;
    exercise_provider_hooks(&hooks);
    exercise_tool_hooks(&hooks);
    exercise_conversation_hooks(&hooks);
}

#[derive(Default, Clone)]
struct RecordingHooks {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingHooks {
    fn push(&self, event: &'static str) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl ProviderOperationHooks for RecordingHooks {
    fn on_attempt_start(&self, _provider: &str, _operation: &str, _attempt: u32) {
        self.push("attempt_start");
    }

    fn on_retry_scheduled(
        &self,
        _provider: &str,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
        self.push("retry_scheduled");
    }

    fn on_success(&self, _provider: &str, _operation: &str, _attempts: u32) {
        self.push("success");
    }

    fn on_failure(&self, _provider: &str, _operation: &str, _attempts: u32, _error: &ProviderError) {
        self.push("failure");
    }

    fn on_cancelled(&self, _provider: &str, _operation: &str, _attempts: u32) {
        self.push("cancelled");
    }
}

impl ToolRuntimeHooks for RecordingHooks {
    fn on_execution_start(&self, _tool_call: &ToolCall, _context: &ToolExecutionContext) {
        self.push("start");
    }

    fn on_execution_success(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        _elapsed: Duration,
    ) {
        self.push("success");
    }

    fn on_execution_failure(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _error: &ToolError,
        _elapsed: Duration,
    ) {
        self.push("failure");
    }

    fn on_remote_server_error(&self, _server_id: &str, _error: &ToolError) {
        self.push("remote_error");
    }
}

impl ConversationHooks for RecordingHooks {
    fn on_turn_state(&self, _thread_id: &ThreadId, _state: TurnState) {
        self.push("state");
    }

    fn on_tool_round(&self, _thread_id: &ThreadId, _round: u32, _calls: usize) {
        self.push("tool_round");
    }

    fn on_turn_completed(&self, _thread_id: &ThreadId, _reply: &StoredMessage, _elapsed: Duration) {
        self.push("completed");
    }

    fn on_turn_failed(&self, _thread_id: &ThreadId, _error: &ChatError, _elapsed: Duration) {
        self.push("failed");
    }

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, _elapsed: Duration) {
        self.push("cancelled");
    }

    fn on_title_generated(&self, _thread_id: &ThreadId, _title: &str) {
        self.push("title");
    }
}

struct PanicHooks;

impl ProviderOperationHooks for PanicHooks {
    fn on_attempt_start(&self, _provider: &str, _operation: &str, _attempt: u32) {
        panic!("attempt_start panic");
    }

    fn on_retry_scheduled(
        &self,
        _provider: &str,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
        panic!("retry_scheduled panic");
    }

    fn on_success(&self, _provider: &str, _operation: &str, _attempts: u32) {
        panic!("success panic");
    }

    fn on_failure(&self, _provider: &str, _operation: &str, _attempts: u32, _error: &ProviderError) {
        panic!("failure panic");
    }

    fn on_cancelled(&self, _provider: &str, _operation: &str, _attempts: u32) {
        panic!("cancelled panic");
    }
}

impl ToolRuntimeHooks for PanicHooks {
    fn on_execution_start(&self, _tool_call: &ToolCall, _context: &ToolExecutionContext) {
        panic!("start panic");
    }

    fn on_execution_success(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        _elapsed: Duration,
    ) {
        panic!("success panic");
    }

    fn on_execution_failure(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _error: &ToolError,
        _elapsed: Duration,
    ) {
        panic!("failure panic");
    }

    fn on_remote_server_error(&self, _server_id: &str, _error: &ToolError) {
        panic!("remote panic");
    }
}

impl ConversationHooks for PanicHooks {
    fn on_turn_state(&self, _thread_id: &ThreadId, _state: TurnState) {
        panic!("state panic");
    }

    fn on_tool_round(&self, _thread_id: &ThreadId, _round: u32, _calls: usize) {
        panic!("tool round panic");
    }

    fn on_turn_completed(&self, _thread_id: &ThreadId, _reply: &StoredMessage, _elapsed: Duration) {
        panic!("completed panic");
    }

    fn on_turn_failed(&self, _thread_id: &ThreadId, _error: &ChatError, _elapsed: Duration) {
        panic!("failed panic");
    }

    fn on_turn_cancelled(&self, _thread_id: &ThreadId, _elapsed: Duration) {
        panic!("cancelled panic");
    }

    fn on_title_generated(&self, _thread_id: &ThreadId, _title: &str) {
        panic!("title panic");
    }
}

#[test]
fn safe_provider_hooks_delegate_when_inner_succeeds() {
    let inner = RecordingHooks::default();
    let events = Arc::clone(&inner.events);
    exercise_provider_hooks(&SafeProviderHooks::new(inner));

    assert_eq!(
        *events.lock().expect("events lock"),
        vec!["attempt_start", "retry_scheduled", "success", "failure", "cancelled"]
    );
}

#[test]
fn safe_tool_hooks_delegate_when_inner_succeeds() {
    let inner = RecordingHooks::default();
    let events = Arc::clone(&inner.events);
    exercise_tool_hooks(&SafeToolHooks::new(inner));

    assert_eq!(events.lock().expect("events lock").len(), 4);
}

#[test]
fn safe_conversation_hooks_delegate_when_inner_succeeds() {
    let inner = RecordingHooks::default();
    let events = Arc::clone(&inner.events);
    exercise_conversation_hooks(&SafeConversationHooks::new(inner));

    assert_eq!(
        *events.lock().expect("events lock"),
        vec!["state", "tool_round", "completed", "failed", "cancelled", "title"]
    );
}

#[test]
fn safe_hooks_swallow_panics() {
    exercise_provider_hooks(&SafeProviderHooks::new(PanicHooks));
    exercise_tool_hooks(&SafeToolHooks::new(PanicHooks));
    exercise_conversation_hooks(&SafeConversationHooks::new(PanicHooks));
}
