//! JSON-RPC bridge between a sandboxed tool UI and the host.
//!
//! A rendered tool UI talks to the host with JSON-RPC 2.0 messages. The bridge answers the
//! capability handshake, proxies `tools/call` to a [`ToolRuntime`] and forwards the
//! `ui/updateContext` and `ui/sendMessage` notifications to a [`UiHost`].
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ttooling::{NoopUiHost, ToolGateway, ToolRegistry, UiBridge};
//!
//! let gateway = Arc::new(ToolGateway::new(Arc::new(ToolRegistry::new())));
//! let bridge = UiBridge::new(gateway, Arc::new(NoopUiHost));
//! assert!(bridge.server_id().is_none());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tprovider::ToolCall;

use crate::gateway::{REMOTE_TOOL_SEPARATOR, namespaced_tool_name};
use crate::{ToolExecutionContext, ToolRuntime};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// Host-side receiver for UI notifications. Every method is best-effort.
pub trait UiHost: Send + Sync {
    fn update_context(&self, _context: Value) {}

    fn send_message(&self, _text: &str) {}

    /// Extra context returned to the UI during `ui/initialize`.
    fn host_context(&self) -> Value {
        json!({})
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUiHost;

impl UiHost for NoopUiHost {}

pub struct UiBridge {
    runtime: Arc<dyn ToolRuntime>,
    host: Arc<dyn UiHost>,
    server_id: Option<String>,
    context: ToolExecutionContext,
    call_counter: AtomicU64,
}

impl UiBridge {
    pub fn new(runtime: Arc<dyn ToolRuntime>, host: Arc<dyn UiHost>) -> Self {
        Self {
            runtime,
            host,
            server_id: None,
            context: ToolExecutionContext::new(),
            call_counter: AtomicU64::new(1),
        }
    }

    /// Binds the bridge to the server that served the UI, so bare tool names resolve there.
    pub fn for_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn with_context(mut self, context: ToolExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    /// Handles one raw message from the UI. Returns the serialized reply, or `None` for
    /// notifications.
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let message = match serde_json::from_str::<Value>(raw) {
            Ok(message) => message,
            Err(err) => {
                return Some(error_reply(Value::Null, PARSE_ERROR, &format!("parse error: {err}")));
            }
        };
        self.handle_value(message).await.map(|reply| reply.to_string())
    }

    pub async fn handle_value(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str);
        let well_formed = message.get("jsonrpc").and_then(Value::as_str) == Some("2.0");

        let Some(method) = method.filter(|_| well_formed) else {
            return Some(error_value(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "invalid request",
            ));
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match method {
            "ui/initialize" => id.map(|id| result_value(id, self.initialize_result())),
            "tools/call" => {
                let id = id?;
                Some(self.call_tool(id, params).await)
            }
            "ui/updateContext" => {
                self.host.update_context(params);
                id.map(|id| result_value(id, json!({})))
            }
            "ui/sendMessage" => {
                if let Some(text) = message_text(&params) {
                    self.host.send_message(&text);
                }
                id.map(|id| result_value(id, json!({})))
            }
            "notifications/initialized" | "ui/notifications/initialized" => None,
            other => id.map(|id| {
                error_value(id, METHOD_NOT_FOUND, &format!("method not found: {other}"))
            }),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": crate::MCP_PROTOCOL_VERSION,
            "hostInfo": {"name": "trellis", "version": env!("CARGO_PKG_VERSION")},
            "hostCapabilities": {
                "toolCalls": {},
                "updateContext": {},
                "sendMessage": {},
            },
            "hostContext": self.host.host_context(),
        })
    }

    async fn call_tool(&self, id: Value, params: Value) -> Value {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return error_value(id, INVALID_PARAMS, "tools/call requires a tool name");
        };
        let name = match &self.server_id {
            Some(server_id) if !name.contains(REMOTE_TOOL_SEPARATOR) => {
                namespaced_tool_name(server_id, name)
            }
            _ => name.to_string(),
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let call = ToolCall {
            id: format!("ui-call-{}", self.call_counter.fetch_add(1, Ordering::Relaxed)),
            name,
            arguments: arguments.to_string(),
        };

        let (text, is_error) = match self.runtime.execute(call, self.context.clone()).await {
            Ok(result) => (result.output, false),
            Err(error) => (error.to_tool_output(), true),
        };

        result_value(
            id,
            json!({
                "content": [{"type": "text", "text": text}],
                "isError": is_error,
            }),
        )
    }
}

fn message_text(params: &Value) -> Option<String> {
    if let Some(text) = params.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    let text = params
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

fn result_value(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_value(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn error_reply(id: Value, code: i64, message: &str) -> String {
    error_value(id, code, message).to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tprovider::ToolDefinition;

    use super::*;
    use crate::{ToolGateway, ToolRegistry};

    #[derive(Default)]
    struct RecordingHost {
        messages: Mutex<Vec<String>>,
        contexts: Mutex<Vec<Value>>,
    }

    impl UiHost for RecordingHost {
        fn update_context(&self, context: Value) {
            self.contexts.lock().expect("contexts lock").push(context);
        }

        fn send_message(&self, text: &str) {
            self.messages
                .lock()
                .expect("messages lock")
                .push(text.to_string());
        }
    }

    fn bridge(host: Arc<RecordingHost>) -> UiBridge {
        let mut registry = ToolRegistry::new();
        registry.register_sync_fn(
            ToolDefinition::function("shout", "Uppercases text", r#"{"type":"object"}"#),
            |args, _| {
                let args = crate::parse_json_object(&args)?;
                Ok(crate::required_string(&args, "text")?.to_uppercase())
            },
        );
        UiBridge::new(Arc::new(ToolGateway::new(Arc::new(registry))), host)
    }

    #[tokio::test]
    async fn initialize_reports_host_capabilities() {
        let bridge = bridge(Arc::new(RecordingHost::default()));
        let reply = bridge
            .handle_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ui/initialize"}))
            .await
            .expect("initialize is a request");

        assert_eq!(reply["id"], 1);
        assert!(reply["result"]["hostCapabilities"]["toolCalls"].is_object());
    }

    #[tokio::test]
    async fn tool_calls_are_proxied_and_errors_become_results() {
        let bridge = bridge(Arc::new(RecordingHost::default()));

        let reply = bridge
            .handle_value(json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "shout", "arguments": {"text": "hi"}}
            }))
            .await
            .expect("reply");
        assert_eq!(reply["result"]["content"][0]["text"], "HI");
        assert_eq!(reply["result"]["isError"], false);

        let reply = bridge
            .handle_value(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "shout", "arguments": {}}
            }))
            .await
            .expect("reply");
        assert_eq!(reply["result"]["isError"], true);
    }

    #[tokio::test]
    async fn notifications_reach_the_host_without_replies() {
        let host = Arc::new(RecordingHost::default());
        let bridge = bridge(host.clone());

        let reply = bridge
            .handle_value(json!({
                "jsonrpc": "2.0", "method": "ui/sendMessage",
                "params": {"content": [{"type": "text", "text": "follow up"}]}
            }))
            .await;
        assert!(reply.is_none());

        let reply = bridge
            .handle_value(json!({
                "jsonrpc": "2.0", "method": "ui/updateContext", "params": {"selection": 3}
            }))
            .await;
        assert!(reply.is_none());

        assert_eq!(*host.messages.lock().expect("lock"), vec!["follow up"]);
        assert_eq!(host.contexts.lock().expect("lock")[0]["selection"], 3);
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_get_error_codes() {
        let bridge = bridge(Arc::new(RecordingHost::default()));

        let reply = bridge.handle_message("{not json").await.expect("reply");
        let reply: Value = serde_json::from_str(&reply).expect("reply is json");
        assert_eq!(reply["error"]["code"], PARSE_ERROR);

        let reply = bridge
            .handle_value(json!({"id": 4, "method": "tools/call"}))
            .await
            .expect("reply");
        assert_eq!(reply["error"]["code"], INVALID_REQUEST);

        let reply = bridge
            .handle_value(json!({"jsonrpc": "2.0", "id": 5, "method": "ui/resize"}))
            .await
            .expect("reply");
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
    }
}
