mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use support::{Reply, ScriptedProvider, builder, contents};
use tchat::{
    ChatErrorKind, ConversationHooks, SendRequest, TurnOutcome, TurnState,
};
use tcommon::ThreadId;
use tprovider::{Message, Role, ToolCall, ToolDefinition};
use ttooling::{
    DefaultToolRuntime, ToolError, ToolExecutionContext, ToolExecutionResult, ToolFuture,
    ToolRegistry, ToolRuntime, UiResource,
};
use ttree::StoredMessage;

fn clock_runtime() -> Arc<DefaultToolRuntime> {
    let mut registry = ToolRegistry::new();
    registry.register_sync_fn(
        ToolDefinition::function(
            "clock",
            "Current time for a city",
            r#"{"type":"object","properties":{"city":{"type":"string"}},"required":["city"]}"#,
        ),
        |arguments, _context| {
            let value: serde_json::Value = serde_json::from_str(&arguments)
                .map_err(|error| ToolError::invalid_arguments(error.to_string()))?;
            match value["city"].as_str() {
                Some(city) => Ok(format!("12:00 in {city}")),
                None => Err(ToolError::invalid_arguments("city is required")),
            }
        },
    );
    Arc::new(DefaultToolRuntime::new(Arc::new(registry)))
}

#[derive(Default)]
struct RecordingHooks {
    states: Mutex<Vec<TurnState>>,
    rounds: Mutex<Vec<(u32, usize)>>,
    completed: Mutex<Vec<String>>,
    failed: Mutex<Vec<ChatErrorKind>>,
}

impl ConversationHooks for RecordingHooks {
    fn on_turn_state(&self, _thread_id: &ThreadId, state: TurnState) {
        self.states.lock().expect("states lock").push(state);
    }

    fn on_tool_round(&self, _thread_id: &ThreadId, round: u32, calls: usize) {
        self.rounds.lock().expect("rounds lock").push((round, calls));
    }

    fn on_turn_completed(&self, _thread_id: &ThreadId, reply: &StoredMessage, _elapsed: Duration) {
        self.completed
            .lock()
            .expect("completed lock")
            .push(reply.content.clone());
    }

    fn on_turn_failed(
        &self,
        _thread_id: &ThreadId,
        error: &tchat::ChatError,
        _elapsed: Duration,
    ) {
        self.failed.lock().expect("failed lock").push(error.kind);
    }
}

#[tokio::test]
async fn tool_round_stores_call_and_result_before_the_final_reply() {
    let provider = ScriptedProvider::new(vec![
        Reply::tool("call-1", "clock", r#"{"city":"Oslo"}"#),
        Reply::text("It is noon in Oslo."),
    ]);
    let hooks = Arc::new(RecordingHooks::default());
    let service = builder(&provider)
        .tools(clock_runtime())
        .hooks(hooks.clone())
        .build();

    let result = service
        .send(SendRequest::new("what time is it in Oslo?"))
        .await
        .expect("send");
    assert!(result.is_completed());

    let [user, request, tool, reply] = &result.persisted[..] else {
        panic!("expected four stored messages, got {}", result.persisted.len());
    };
    assert_eq!(request.role, Role::Assistant);
    assert_eq!(request.parent_id.as_ref(), Some(&user.id));
    assert_eq!(request.tool_calls.len(), 1);
    assert_eq!(request.tool_calls[0].name, "clock");
    assert_eq!(tool.role, Role::Tool);
    assert_eq!(tool.parent_id.as_ref(), Some(&request.id));
    assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(tool.content, "12:00 in Oslo");
    assert_eq!(reply.parent_id.as_ref(), Some(&tool.id));
    assert_eq!(reply.content, "It is noon in Oslo.");

    let path = service.active_path(&result.thread_id).await.expect("path");
    assert_eq!(path.len(), 4);

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "clock");
    let followup = &requests[1].messages;
    assert_eq!(followup.len(), 3);
    assert_eq!(followup[1].tool_calls, request.tool_calls);
    assert_eq!(followup[2], Message::tool_result("call-1", "12:00 in Oslo"));

    assert_eq!(*hooks.rounds.lock().expect("rounds lock"), vec![(1, 1)]);
    assert_eq!(
        *hooks.completed.lock().expect("completed lock"),
        vec!["It is noon in Oslo.".to_string()]
    );
    let states = hooks.states.lock().expect("states lock").clone();
    assert_eq!(
        states,
        vec![
            TurnState::UserMessagePersisted,
            TurnState::AwaitingProviderReply,
            TurnState::StreamingReply,
            TurnState::ToolCallsPending,
            TurnState::AwaitingProviderReply,
            TurnState::StreamingReply,
            TurnState::Idle,
        ]
    );
}

#[tokio::test]
async fn tool_failures_are_fed_back_as_error_content() {
    let provider = ScriptedProvider::new(vec![
        Reply::Tools(vec![
            ToolCall {
                id: "call-1".to_string(),
                name: "clock".to_string(),
                arguments: "{}".to_string(),
            },
            ToolCall {
                id: "call-2".to_string(),
                name: "weather".to_string(),
                arguments: "{}".to_string(),
            },
        ]),
        Reply::text("Sorry, I could not check."),
    ]);
    let service = builder(&provider).tools(clock_runtime()).build();

    let result = service.send(SendRequest::new("time and weather?")).await.expect("send");
    assert!(result.is_completed());

    let tool_outputs = result
        .persisted
        .iter()
        .filter(|message| message.role == Role::Tool)
        .collect::<Vec<_>>();
    assert_eq!(tool_outputs.len(), 2);
    assert!(tool_outputs[0].content.starts_with("Error: "));
    assert!(tool_outputs[0].content.contains("city is required"));
    assert!(tool_outputs[1].content.starts_with("Error: "));
    assert_eq!(tool_outputs[1].parent_id.as_ref(), Some(&tool_outputs[0].id));
    assert_eq!(
        result.final_message().expect("reply").content,
        "Sorry, I could not check."
    );
}

#[tokio::test]
async fn tool_round_cap_ends_the_turn_with_an_error_note() {
    let provider = ScriptedProvider::new(vec![
        Reply::tool("call-1", "clock", r#"{"city":"Oslo"}"#),
        Reply::tool("call-2", "clock", r#"{"city":"Lima"}"#),
        Reply::text("never reached"),
    ]);
    let hooks = Arc::new(RecordingHooks::default());
    let service = builder(&provider)
        .tools(clock_runtime())
        .policy(support::policy().with_max_tool_rounds(1))
        .hooks(hooks.clone())
        .build();

    let result = service.send(SendRequest::new("loop forever")).await.expect("send");
    let TurnOutcome::Failed(error) = &result.outcome else {
        panic!("expected a failed turn, got {:?}", result.outcome);
    };
    assert_eq!(error.kind, ChatErrorKind::Tooling);

    let note = result.final_message().expect("note");
    assert!(note.is_error_note());
    assert!(note.content.contains("1 tool rounds"));
    assert_eq!(provider.requests().len(), 2);
    assert_eq!(
        *hooks.failed.lock().expect("failed lock"),
        vec![ChatErrorKind::Tooling]
    );
}

#[tokio::test]
async fn models_without_tool_support_get_no_tool_schemas() {
    let provider = ScriptedProvider::new(vec![Reply::text("plain")]);
    let catalog = support::catalog_with(
        tprovider::ModelConfig::new("fake", "m1").with_capabilities(tprovider::ModelCapabilities {
            tools: false,
            ..tprovider::ModelCapabilities::default()
        }),
    );
    let service = builder(&provider)
        .catalog(catalog)
        .tools(clock_runtime())
        .build();

    service.send(SendRequest::new("hello")).await.expect("send");
    assert!(provider.requests()[0].tools.is_empty());
}

/// Runtime whose single tool answers with an interactive UI attached.
struct DashboardRuntime;

impl ToolRuntime for DashboardRuntime {
    fn definitions<'a>(
        &'a self,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Vec<ToolDefinition>> {
        Box::pin(async {
            vec![ToolDefinition::function(
                "dashboard",
                "Open the sales dashboard",
                r#"{"type":"object"}"#,
            )]
        })
    }

    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(async move {
            assert!(context.thread_id.is_some());
            Ok(ToolExecutionResult::from_call(&tool_call, "dashboard opened").with_ui_resource(
                Some(UiResource::new("ui://sales/dashboard").with_server_id("sales")),
            ))
        })
    }
}

#[tokio::test]
async fn tool_ui_resources_are_kept_on_the_result_node() {
    let provider = ScriptedProvider::new(vec![
        Reply::tool("call-1", "dashboard", "{}"),
        Reply::text("Here is the dashboard."),
    ]);
    let service = builder(&provider).tools(Arc::new(DashboardRuntime)).build();

    let result = service.send(SendRequest::new("show sales")).await.expect("send");
    let tool = result
        .persisted
        .iter()
        .find(|message| message.role == Role::Tool)
        .expect("tool node");
    let resource = tool.ui_resource.as_ref().expect("ui resource");
    assert_eq!(resource.uri, "ui://sales/dashboard");
    assert_eq!(resource.server_id.as_deref(), Some("sales"));

    let path = service.active_path(&result.thread_id).await.expect("path");
    assert_eq!(
        contents(&path),
        vec!["show sales", "", "dashboard opened", "Here is the dashboard."]
    );
}
