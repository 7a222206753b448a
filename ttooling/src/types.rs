//! Tool execution context, results and UI resource descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tcommon::{MetadataMap, ThreadId};
use tprovider::{ModelCapabilities, ProviderKind, ToolCall};

/// Who is asking for tools, and for which model.
///
/// The provider kind and capabilities decide whether provider-native tools are offered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolExecutionContext {
    pub thread_id: Option<ThreadId>,
    pub provider_kind: Option<ProviderKind>,
    pub capabilities: ModelCapabilities,
    pub metadata: MetadataMap,
}

impl ToolExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_thread(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, provider_kind: ProviderKind, capabilities: ModelCapabilities) -> Self {
        self.provider_kind = Some(provider_kind);
        self.capabilities = capabilities;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True when the model can run the provider-native web search tool.
    pub fn allows_native_web_search(&self) -> bool {
        self.capabilities.web_search
            && self
                .provider_kind
                .is_some_and(ProviderKind::supports_native_web_search)
    }
}

/// Locator for an interactive tool UI rendered in an isolated sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiResource {
    pub uri: String,
    /// Name of the remote server that owns the resource, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Sandbox permission policy as declared by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Value>,
    /// Content security / allowed origin policy as declared by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csp: Option<Value>,
}

impl UiResource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            server_id: None,
            permissions: None,
            csp: None,
        }
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub output: String,
    pub ui_resource: Option<UiResource>,
}

impl ToolExecutionResult {
    pub fn new(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            ui_resource: None,
        }
    }

    pub fn from_call(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call.id.clone(), output)
    }

    pub fn with_ui_resource(mut self, ui_resource: Option<UiResource>) -> Self {
        self.ui_resource = ui_resource;
        self
    }
}
