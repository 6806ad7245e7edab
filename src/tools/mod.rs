//! Tools module - Tool definitions and execution for LLM function calling
//!
//! # Overview
//!
//! - [`Tool`]: the interface every in-process tool implements
//! - [`ToolRegistry`]: descriptors for the model plus routes for the dispatcher,
//!   built from [`CapabilityProvider`]s (local tool sets and MCP servers)
//! - [`ToolDispatcher`]: turns a model tool call into result text
//!
//! # Built-in Tools
//!
//! - `echo`, `get_current_time`, `base64_encode`, `base64_decode`
//! - container shell: `send_shell_input`, `get_shell_output`, `restart_shell_session`
//! - port forwarding: `expose_container_port`, `list_exposed_ports`, `close_exposed_port`
//! - file copy: `copy_to_container`, `copy_from_container`
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use muli::tools::{builtin_tools, LocalProvider, ToolDispatcher, ToolRegistry};
//!
//! # tokio_test::block_on(async {
//! let registry = ToolRegistry::build(vec![Arc::new(LocalProvider::new(
//!     "builtin",
//!     builtin_tools(),
//! ))])
//! .await;
//! let dispatcher = ToolDispatcher::new(registry);
//!
//! let result = dispatcher.invoke("echo", r#"{"message": "Hello!"}"#).await;
//! assert_eq!(result, "Hello!");
//! assert!(dispatcher.registry().len() >= 4);
//! # });
//! ```

pub mod base64;
pub mod container_files;
mod dispatcher;
mod echo;
pub mod mcp;
pub mod port_forward;
mod registry;
pub mod shell_session;
pub mod time;
mod types;

pub use dispatcher::{ToolDispatcher, NO_OUTPUT};
pub use echo::EchoTool;
pub use registry::{Capability, CapabilityProvider, LocalProvider, ToolRegistry, ToolRoute};
pub use types::{
    optional_str, port_arg, required_str, schema_from_params, string_list, ParamKind, Tool,
    ToolParam, ToolResult,
};

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::runtime::ContainerEnvironment;

use self::base64::{Base64DecodeTool, Base64EncodeTool};
use self::container_files::{CopyFromContainerTool, CopyToContainerTool};
use self::mcp::McpProvider;
use self::port_forward::{
    ClosePortTool, ExposePortTool, ListPortsTool, PortForwardRelay, SharedRelay,
};
use self::shell_session::{
    GetShellOutputTool, RestartShellSessionTool, SendShellInputTool, SessionBroker, SharedBroker,
};
use self::time::CurrentTimeTool;

/// Stateless leaf tools.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EchoTool),
        Arc::new(CurrentTimeTool),
        Arc::new(Base64EncodeTool),
        Arc::new(Base64DecodeTool),
    ]
}

/// Owned container resources shared by the container tools.
pub struct ContainerTools {
    pub broker: SharedBroker,
    pub relay: SharedRelay,
    pub tools: Vec<Arc<dyn Tool>>,
}

/// Build the shell, port and copy tools around one broker and one relay.
///
/// The tools are always registered; while `shell.enable` is off every call
/// returns the disabled message.
pub fn container_tools(environment: Arc<dyn ContainerEnvironment>, config: &Config) -> ContainerTools {
    let shell = &config.shell;
    let broker: SharedBroker = Arc::new(Mutex::new(SessionBroker::new(
        Arc::clone(&environment),
        shell,
    )));
    let relay: SharedRelay = Arc::new(Mutex::new(PortForwardRelay::new(
        Arc::clone(&environment),
        shell,
    )));

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(SendShellInputTool::new(
            Arc::clone(&broker),
            shell.mount_mapping.as_deref(),
        )),
        Arc::new(GetShellOutputTool::new(Arc::clone(&broker))),
        Arc::new(RestartShellSessionTool::new(Arc::clone(&broker))),
        Arc::new(ExposePortTool::new(Arc::clone(&relay))),
        Arc::new(ListPortsTool::new(Arc::clone(&relay))),
        Arc::new(ClosePortTool::new(Arc::clone(&relay))),
        Arc::new(CopyToContainerTool::new(Arc::clone(&environment), shell)),
        Arc::new(CopyFromContainerTool::new(environment, shell)),
    ];

    ContainerTools {
        broker,
        relay,
        tools,
    }
}

/// One provider per configured MCP server.
pub fn mcp_providers(config: &Config) -> Vec<Arc<dyn CapabilityProvider>> {
    config
        .mcp
        .servers
        .iter()
        .map(|server| Arc::new(McpProvider::from_config(server)) as Arc<dyn CapabilityProvider>)
        .collect()
}
