//! Tool gateway: one [`ToolRuntime`] over local tools, provider-native tools and remote servers.
//!
//! Remote tools are advertised as `server__tool`. Execution tries an exact local match first and
//! otherwise splits the name at the first `__`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::Value;
use tprovider::{BuiltinTool, ToolCall, ToolDefinition};

use crate::{
    DefaultToolRuntime, NoopToolRuntimeHooks, RemoteToolManager, ToolError, ToolErrorKind,
    ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolRegistry, ToolRuntime,
    ToolRuntimeHooks, UiResource, parse_json_value,
};

pub const REMOTE_TOOL_SEPARATOR: &str = "__";

pub fn namespaced_tool_name(server_id: &str, tool_name: &str) -> String {
    format!("{server_id}{REMOTE_TOOL_SEPARATOR}{tool_name}")
}

pub fn split_namespaced_tool_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(REMOTE_TOOL_SEPARATOR)
        .filter(|(server, tool)| !server.is_empty() && !tool.is_empty())
}

pub struct ToolGateway {
    local: DefaultToolRuntime,
    remote: Option<Arc<RemoteToolManager>>,
    builtins: HashSet<BuiltinTool>,
    hooks: Arc<dyn ToolRuntimeHooks>,
    listed_ui: Mutex<HashMap<String, UiResource>>,
}

impl ToolGateway {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            local: DefaultToolRuntime::new(registry),
            remote: None,
            builtins: HashSet::from([BuiltinTool::WebSearch]),
            hooks: Arc::new(NoopToolRuntimeHooks),
            listed_ui: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_remote(mut self, manager: Arc<RemoteToolManager>) -> Self {
        self.remote = Some(manager);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.local = self.local.with_timeout(timeout);
        self
    }

    pub fn with_builtin(mut self, tool: BuiltinTool, enabled: bool) -> Self {
        if enabled {
            self.builtins.insert(tool);
        } else {
            self.builtins.remove(&tool);
        }
        self
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.local.registry()
    }

    pub fn remote(&self) -> Option<&Arc<RemoteToolManager>> {
        self.remote.as_ref()
    }

    fn builtin_definitions(&self, context: &ToolExecutionContext) -> Vec<ToolDefinition> {
        let mut definitions = Vec::new();
        if self.builtins.contains(&BuiltinTool::WebSearch) && context.allows_native_web_search() {
            definitions.push(ToolDefinition::builtin(BuiltinTool::WebSearch));
        }
        definitions
    }

    async fn remote_definitions(&self) -> Vec<ToolDefinition> {
        let Some(manager) = &self.remote else {
            return Vec::new();
        };

        let servers = manager.enabled_servers().await;
        let listings = join_all(servers.iter().map(|server| async move {
            let listing = match manager.server(&server.id).await {
                Ok(connection) => connection.list_tools().await,
                Err(error) => Err(error),
            };
            (server.id.as_str(), listing)
        }))
        .await;

        let mut definitions = Vec::new();
        let mut listed_ui = HashMap::new();
        for (server_id, listing) in listings {
            let tools = match listing {
                Ok(tools) => tools,
                Err(error) => {
                    if error.kind == ToolErrorKind::Unavailable {
                        manager.invalidate(server_id).await;
                    }
                    self.hooks.on_remote_server_error(server_id, &error);
                    continue;
                }
            };

            for tool in tools {
                let name = namespaced_tool_name(server_id, &tool.name);
                if let Some(resource) = tool.ui_resource {
                    listed_ui.insert(name.clone(), resource.with_server_id(server_id));
                }
                definitions.push(ToolDefinition::function(
                    name,
                    tool.description,
                    tool.input_schema.to_string(),
                ));
            }
        }

        if let Ok(mut cache) = self.listed_ui.lock() {
            *cache = listed_ui;
        }
        definitions
    }

    async fn dispatch(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
    ) -> Result<ToolExecutionResult, ToolError> {
        if self.local.handles(&tool_call.name) {
            return self.local.execute(tool_call.clone(), context.clone()).await;
        }

        let Some((server_id, tool_name)) = split_namespaced_tool_name(&tool_call.name) else {
            return Err(ToolError::not_found(format!(
                "tool '{}' is not registered",
                tool_call.name
            )));
        };
        let Some(manager) = &self.remote else {
            return Err(ToolError::not_found(format!(
                "no remote tool servers are configured for '{}'",
                tool_call.name
            )));
        };

        let arguments = parse_json_value(&tool_call.arguments)?;
        let server = manager.server(server_id).await?;
        let envelope = match server.call_tool(tool_name, arguments).await {
            Ok(envelope) => envelope,
            Err(error) => {
                if error.kind == ToolErrorKind::Unavailable {
                    manager.invalidate(server_id).await;
                }
                return Err(error);
            }
        };

        let output = envelope_text(&envelope);
        if envelope.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(ToolError::execution(output));
        }

        let ui_resource = ui_resource_from_envelope(&envelope)
            .map(|resource| resource.with_server_id(server_id))
            .or_else(|| {
                self.listed_ui
                    .lock()
                    .ok()
                    .and_then(|cache| cache.get(&tool_call.name).cloned())
            });

        Ok(ToolExecutionResult::from_call(tool_call, output).with_ui_resource(ui_resource))
    }
}

impl ToolRuntime for ToolGateway {
    fn definitions<'a>(
        &'a self,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Vec<ToolDefinition>> {
        Box::pin(async move {
            if !context.capabilities.tools {
                return Vec::new();
            }

            let mut definitions = self.local.registry().definitions();
            definitions.extend(self.builtin_definitions(context));
            definitions.extend(self.remote_definitions().await);
            definitions
        })
    }

    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(async move {
            self.hooks.on_execution_start(&tool_call, &context);
            let started = Instant::now();

            match self.dispatch(&tool_call, &context).await {
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

/// Joins the `text` items of a tool result envelope.
fn envelope_text(envelope: &Value) -> String {
    let Some(content) = envelope.get("content").and_then(Value::as_array) else {
        return match envelope {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
    };

    content
        .iter()
        .filter_map(|item| match item.get("type").and_then(Value::as_str) {
            Some("text") => item.get("text").and_then(Value::as_str).map(str::to_string),
            Some("resource") => item
                .get("resource")
                .and_then(|resource| resource.get("text"))
                .and_then(Value::as_str)
                .filter(|_| !is_ui_resource_item(item))
                .map(str::to_string),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_ui_resource_item(item: &Value) -> bool {
    item.get("resource")
        .and_then(|resource| resource.get("uri"))
        .and_then(Value::as_str)
        .is_some_and(|uri| uri.starts_with("ui://"))
}

/// Reads `ui.resourceUri` or the flat `ui/resourceUri` key from a `_meta` object.
pub(crate) fn ui_resource_from_meta(meta: &Value) -> Option<UiResource> {
    if let Some(ui) = meta.get("ui")
        && let Some(uri) = ui.get("resourceUri").and_then(Value::as_str)
    {
        let mut resource = UiResource::new(uri);
        resource.permissions = ui.get("permissions").cloned();
        resource.csp = ui.get("csp").cloned();
        return Some(resource);
    }

    meta.get("ui/resourceUri")
        .and_then(Value::as_str)
        .map(UiResource::new)
}

/// UI metadata carried by a call result, if any.
pub fn ui_resource_from_envelope(envelope: &Value) -> Option<UiResource> {
    if let Some(resource) = envelope.get("_meta").and_then(ui_resource_from_meta) {
        return Some(resource);
    }

    envelope
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .find(|item| is_ui_resource_item(item))
        .and_then(|item| item.get("resource"))
        .and_then(|resource| resource.get("uri"))
        .and_then(Value::as_str)
        .map(UiResource::new)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn namespaced_names_split_at_first_separator() {
        assert_eq!(namespaced_tool_name("files", "read"), "files__read");
        assert_eq!(
            split_namespaced_tool_name("files__read__all"),
            Some(("files", "read__all"))
        );
        assert_eq!(split_namespaced_tool_name("plain"), None);
        assert_eq!(split_namespaced_tool_name("__read"), None);
    }

    #[test]
    fn envelope_text_joins_text_items_and_skips_ui_resources() {
        let envelope = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "AAAA"},
                {"type": "resource", "resource": {"uri": "ui://view", "text": "<html/>"}},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(envelope_text(&envelope), "first\nsecond");
        assert_eq!(envelope_text(&json!("bare")), "bare");
    }

    #[test]
    fn ui_resource_lookup_order() {
        let nested = json!({"_meta": {"ui": {"resourceUri": "ui://nested", "csp": {"connect": []}}}});
        let resource = ui_resource_from_envelope(&nested).expect("nested meta");
        assert_eq!(resource.uri, "ui://nested");
        assert!(resource.csp.is_some());

        let flat = json!({"_meta": {"ui/resourceUri": "ui://flat"}});
        assert_eq!(
            ui_resource_from_envelope(&flat).map(|resource| resource.uri),
            Some("ui://flat".to_string())
        );

        let content = json!({"content": [{"type": "resource", "resource": {"uri": "ui://inline"}}]});
        assert_eq!(
            ui_resource_from_envelope(&content).map(|resource| resource.uri),
            Some("ui://inline".to_string())
        );

        assert!(ui_resource_from_envelope(&json!({"content": []})).is_none());
    }
}
