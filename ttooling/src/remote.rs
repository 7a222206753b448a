//! Remote tool servers reached over JSON-RPC 2.0 on HTTP.
//!
//! Connections are opened lazily the first time a server's tools are needed and cached per
//! server id. A server that fails to connect surfaces as a [`ToolError`] instead of aborting the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};

use crate::{REMOTE_TOOL_SEPARATOR, ToolError, ToolFuture, UiResource};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToolServerConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RemoteToolServerConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Server ids prefix advertised tool names, so they cannot be empty or hold the separator.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.id.trim().is_empty() {
            return Err(ToolError::invalid_arguments("tool server id must not be empty"));
        }
        if self.id.contains(REMOTE_TOOL_SEPARATOR) {
            return Err(ToolError::invalid_arguments(format!(
                "tool server id '{}' must not contain '{REMOTE_TOOL_SEPARATOR}'",
                self.id
            )));
        }
        Ok(())
    }
}

/// A tool as listed by a remote server, before namespacing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub ui_resource: Option<UiResource>,
}

impl RemoteTool {
    fn from_listing(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        Some(Self {
            name,
            description: value
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema: value
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"})),
            ui_resource: value.get("_meta").and_then(crate::gateway::ui_resource_from_meta),
        })
    }
}

pub trait RemoteToolServer: Send + Sync {
    fn list_tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<RemoteTool>, ToolError>>;

    /// Returns the raw result envelope (`content`, `isError`, `_meta`).
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> ToolFuture<'a, Result<Value, ToolError>>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client for one HTTP tool server.
///
/// Accepts both plain JSON replies and single-response event streams.
#[derive(Debug)]
pub struct McpHttpClient {
    client: Client,
    config: RemoteToolServerConfig,
    request_id: AtomicU64,
    session_id: Mutex<Option<String>>,
}

impl McpHttpClient {
    pub fn new(client: Client, config: RemoteToolServerConfig) -> Self {
        Self {
            client,
            config,
            request_id: AtomicU64::new(1),
            session_id: Mutex::new(None),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.config.id
    }

    /// Performs the `initialize` handshake followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<Value, ToolError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "trellis", "version": env!("CARGO_PKG_VERSION")},
                }),
            )
            .await
            .map_err(|err| {
                ToolError::unavailable(format!(
                    "failed to initialize tool server '{}': {}",
                    self.config.id, err.message
                ))
            })?;

        self.notify("notifications/initialized").await?;
        Ok(result)
    }

    async fn notify(&self, method: &str) -> Result<(), ToolError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        };
        let response = self.post(&body).await?;
        if !response.status().is_success() {
            return Err(ToolError::unavailable(format!(
                "tool server '{}' rejected {method}: HTTP {}",
                self.config.id,
                response.status()
            )));
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params: Some(params),
        };

        let response = self.post(&body).await?;
        let status = response.status();
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|err| ToolError::unavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(ToolError::unavailable(format!(
                "tool server '{}' returned HTTP {status}: {}",
                self.config.id,
                truncate(&text, 512)
            )));
        }

        let reply = if is_event_stream {
            parse_event_stream_reply(&text, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&text).map_err(|err| {
                ToolError::protocol(format!("invalid JSON-RPC reply for {method}: {err}"))
            })?
        };

        if let Some(error) = reply.error {
            return Err(ToolError::protocol(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }

    async fn post(&self, body: &JsonRpcRequest<'_>) -> Result<reqwest::Response, ToolError> {
        let mut builder = self
            .client
            .post(&self.config.url)
            .header(
                reqwest::header::ACCEPT,
                "application/json, text/event-stream",
            )
            .json(body);

        for (name, value) in &self.config.headers {
            builder = builder.header(name, value);
        }
        if let Some(session) = self.session_id.lock().await.as_ref() {
            builder = builder.header(SESSION_HEADER, session);
        }

        builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ToolError::timeout(format!("tool server '{}' timed out", self.config.id))
            } else {
                ToolError::unavailable(format!(
                    "tool server '{}' is unreachable: {err}",
                    self.config.id
                ))
            }
        })
    }
}

impl RemoteToolServer for McpHttpClient {
    fn list_tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<RemoteTool>, ToolError>> {
        Box::pin(async move {
            let result = self.request("tools/list", json!({})).await?;
            let tools = result
                .get("tools")
                .and_then(Value::as_array)
                .map(|tools| tools.iter().filter_map(RemoteTool::from_listing).collect())
                .unwrap_or_default();
            Ok(tools)
        })
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> ToolFuture<'a, Result<Value, ToolError>> {
        Box::pin(async move {
            self.request("tools/call", json!({"name": name, "arguments": arguments}))
                .await
        })
    }
}

fn parse_event_stream_reply(text: &str, id: u64) -> Result<JsonRpcResponse, ToolError> {
    let mut fallback = None;
    for line in text.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let Ok(reply) = serde_json::from_str::<JsonRpcResponse>(data.trim()) else {
            continue;
        };
        if reply.id.as_ref().and_then(Value::as_u64) == Some(id) {
            return Ok(reply);
        }
        if reply.result.is_some() || reply.error.is_some() {
            fallback = Some(reply);
        }
    }

    fallback.ok_or_else(|| ToolError::protocol("event stream carried no JSON-RPC reply"))
}

fn truncate(input: &str, max: usize) -> &str {
    match input.char_indices().nth(max) {
        Some((index, _)) => &input[..index],
        None => input,
    }
}

/// Opens a connection to one configured server.
pub trait RemoteServerConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        config: &'a RemoteToolServerConfig,
    ) -> ToolFuture<'a, Result<Arc<dyn RemoteToolServer>, ToolError>>;
}

#[derive(Debug, Clone)]
pub struct HttpServerConnector {
    client: Client,
}

impl HttpServerConnector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ToolError::other(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::new(client))
    }
}

impl RemoteServerConnector for HttpServerConnector {
    fn connect<'a>(
        &'a self,
        config: &'a RemoteToolServerConfig,
    ) -> ToolFuture<'a, Result<Arc<dyn RemoteToolServer>, ToolError>> {
        Box::pin(async move {
            let client = McpHttpClient::new(self.client.clone(), config.clone());
            client.initialize().await?;
            Ok(Arc::new(client) as Arc<dyn RemoteToolServer>)
        })
    }
}

/// Server configuration plus a lazily filled connection cache.
pub struct RemoteToolManager {
    connector: Arc<dyn RemoteServerConnector>,
    servers: RwLock<Vec<RemoteToolServerConfig>>,
    connections: Mutex<HashMap<String, Arc<dyn RemoteToolServer>>>,
}

impl RemoteToolManager {
    pub fn new(connector: Arc<dyn RemoteServerConnector>) -> Self {
        Self {
            connector,
            servers: RwLock::new(Vec::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_servers(
        connector: Arc<dyn RemoteServerConnector>,
        servers: Vec<RemoteToolServerConfig>,
    ) -> Self {
        Self {
            connector,
            servers: RwLock::new(servers),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the server list and drops cached connections for servers that changed or left.
    pub async fn set_servers(&self, servers: Vec<RemoteToolServerConfig>) {
        let mut current = self.servers.write().await;
        let mut connections = self.connections.lock().await;
        connections.retain(|id, _| {
            let before = current.iter().find(|server| &server.id == id);
            let after = servers.iter().find(|server| &server.id == id);
            matches!((before, after), (Some(a), Some(b)) if a == b && b.enabled)
        });
        *current = servers;
    }

    pub async fn enabled_servers(&self) -> Vec<RemoteToolServerConfig> {
        self.servers
            .read()
            .await
            .iter()
            .filter(|server| server.enabled)
            .cloned()
            .collect()
    }

    /// Returns a cached connection, connecting on first use.
    ///
    /// No lock is held while connecting, so a slow server never blocks the others. When two
    /// connects to the same server race, the first cached connection wins.
    pub async fn server(&self, server_id: &str) -> Result<Arc<dyn RemoteToolServer>, ToolError> {
        let config = self
            .servers
            .read()
            .await
            .iter()
            .find(|server| server.id == server_id && server.enabled)
            .cloned()
            .ok_or_else(|| {
                ToolError::not_found(format!("tool server '{server_id}' is not configured"))
            })?;
        config.validate()?;

        if let Some(server) = self.connections.lock().await.get(server_id) {
            return Ok(Arc::clone(server));
        }

        let server = self.connector.connect(&config).await?;
        let mut connections = self.connections.lock().await;
        let cached = connections.entry(server_id.to_string()).or_insert(server);
        Ok(Arc::clone(cached))
    }

    /// Forgets a cached connection so the next use reconnects.
    pub async fn invalidate(&self, server_id: &str) -> bool {
        self.connections.lock().await.remove(server_id).is_some()
    }

    pub async fn connected_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}
