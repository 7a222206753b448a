//! Tool layer for the conversation engine.
//!
//! Local tools live in a [`ToolRegistry`] and run through [`DefaultToolRuntime`]. The
//! [`ToolGateway`] adds provider-native tools and remote tool servers on top, and is what the
//! conversation loop normally talks to through the [`ToolRuntime`] trait.

mod args;
mod error;
mod gateway;
mod hooks;
mod registry;
mod remote;
mod runtime;
mod tool;
mod types;
mod ui_bridge;

pub mod prelude {
    pub use crate::{
        DefaultToolRuntime, RemoteToolManager, RemoteToolServerConfig, Tool, ToolError,
        ToolErrorKind, ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolGateway,
        ToolRegistry, ToolRuntime, ToolRuntimeHooks, UiResource,
    };
}

pub use args::{optional_string, parse_args, parse_json_object, parse_json_value, required_string};
pub use error::{ToolError, ToolErrorKind};
pub use gateway::{
    REMOTE_TOOL_SEPARATOR, ToolGateway, namespaced_tool_name, split_namespaced_tool_name,
    ui_resource_from_envelope,
};
pub use hooks::{NoopToolRuntimeHooks, ToolRuntimeHooks};
pub use registry::ToolRegistry;
pub use remote::{
    HttpServerConnector, MCP_PROTOCOL_VERSION, McpHttpClient, RemoteServerConnector, RemoteTool,
    RemoteToolManager, RemoteToolServer, RemoteToolServerConfig,
};
pub use runtime::{DefaultToolRuntime, ToolRuntime};
pub use tool::{FunctionTool, Tool, ToolFuture};
pub use types::{ToolExecutionContext, ToolExecutionResult, UiResource};
pub use ui_bridge::{
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, NoopUiHost, PARSE_ERROR, UiBridge, UiHost,
};
