//! Tool registry for muli
//!
//! The registry is built once at startup from a list of capability providers.
//! It holds two views of the same set of tools:
//! - the descriptors given to the model
//! - the route map the dispatcher uses to reach each tool
//!
//! A tool is in both or in neither. A provider that fails to load, or a tool
//! whose definition is malformed, is logged and left out, so the model is
//! never told about a tool that cannot be reached.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::error::Result;
use crate::providers::ToolDescriptor;

use super::mcp::{remote_capability, McpClient, McpTool};
use super::Tool;

static TOOL_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Where a tool name leads.
#[derive(Clone)]
pub enum ToolRoute {
    /// In-process tool
    Local(Arc<dyn Tool>),
    /// Tool on a remote capability server
    Remote {
        client: Arc<McpClient>,
        remote_name: String,
    },
}

impl std::fmt::Debug for ToolRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolRoute::Local(tool) => write!(f, "Local({})", tool.name()),
            ToolRoute::Remote {
                client,
                remote_name,
            } => write!(f, "Remote({}:{})", client.name(), remote_name),
        }
    }
}

/// A tool as offered by a provider: what the model sees plus how to reach it.
pub struct Capability {
    pub descriptor: ToolDescriptor,
    pub route: ToolRoute,
}

impl Capability {
    /// Wrap a local tool.
    pub fn local(tool: Arc<dyn Tool>) -> Self {
        Self {
            descriptor: tool.descriptor(),
            route: ToolRoute::Local(tool),
        }
    }
}

/// A source of tools scanned when the registry is built.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce the provider's tools. An error drops the whole provider.
    async fn load(&self) -> Result<Vec<Capability>>;
}

/// A fixed set of in-process tools.
pub struct LocalProvider {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl LocalProvider {
    pub fn new(name: &str, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            name: name.to_string(),
            tools,
        }
    }
}

#[async_trait]
impl CapabilityProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<Capability>> {
        Ok(self.tools.iter().cloned().map(Capability::local).collect())
    }
}

/// Descriptor list plus route map.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use muli::tools::{EchoTool, ToolRegistry};
///
/// let mut registry = ToolRegistry::new();
/// assert!(registry.register_local(Arc::new(EchoTool)));
/// assert!(registry.has("echo"));
/// assert_eq!(registry.descriptors()[0].name, "echo");
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
    descriptors: Vec<ToolDescriptor>,
    routes: HashMap<String, ToolRoute>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every provider, in order. Earlier providers win name clashes.
    pub async fn build(providers: Vec<Arc<dyn CapabilityProvider>>) -> Self {
        let mut registry = Self {
            providers,
            ..Self::default()
        };
        registry.scan().await;
        registry
    }

    /// Rebuild from the same providers (e.g. after a remote server restarted).
    pub async fn reload(&mut self) {
        self.descriptors.clear();
        self.routes.clear();
        self.scan().await;
    }

    /// Providers load concurrently; registration follows provider order so
    /// the first provider still wins a name clash.
    async fn scan(&mut self) {
        let providers = self.providers.clone();
        let loaded = join_all(providers.iter().map(|provider| provider.load())).await;
        for (provider, result) in providers.iter().zip(loaded) {
            match result {
                Ok(capabilities) => {
                    let offered = capabilities.len();
                    let accepted = capabilities
                        .into_iter()
                        .filter(|cap| self.insert(provider.name(), cap))
                        .count();
                    info!(
                        provider = %provider.name(),
                        offered,
                        accepted,
                        "Capability provider loaded"
                    );
                }
                Err(e) => {
                    warn!(provider = %provider.name(), error = %e, "Skipping capability provider");
                }
            }
        }
    }

    /// Register one local tool directly. Returns false if it was rejected.
    pub fn register_local(&mut self, tool: Arc<dyn Tool>) -> bool {
        let cap = Capability::local(tool);
        self.insert("local", &cap)
    }

    /// Register tools already listed from a remote server. Returns how many
    /// were accepted.
    pub fn register_remote(
        &mut self,
        server: &str,
        client: Arc<McpClient>,
        tools: Vec<McpTool>,
    ) -> usize {
        tools
            .into_iter()
            .map(|tool| remote_capability(&client, tool))
            .filter(|cap| self.insert(server, cap))
            .count()
    }

    fn insert(&mut self, source: &str, cap: &Capability) -> bool {
        let name = &cap.descriptor.name;
        if let Err(reason) = validate_descriptor(&cap.descriptor) {
            warn!(provider = %source, tool = %name, reason = %reason, "Skipping malformed tool");
            return false;
        }
        if self.routes.contains_key(name) {
            warn!(provider = %source, tool = %name, "Skipping duplicate tool name");
            return false;
        }
        info!(provider = %source, tool = %name, "Registering tool");
        self.routes.insert(name.clone(), cap.route.clone());
        self.descriptors.push(cap.descriptor.clone());
        true
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn route(&self, name: &str) -> Option<&ToolRoute> {
        self.routes.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Names must be usable as function names by the oracle.
fn validate_descriptor(descriptor: &ToolDescriptor) -> std::result::Result<(), String> {
    if !TOOL_NAME_RE.is_match(&descriptor.name) {
        return Err("name must be 1-64 letters, digits, '_' or '-'".to_string());
    }
    let Some(schema) = descriptor.parameters.as_object() else {
        return Err("parameter schema is not a JSON object".to_string());
    };
    match schema.get("type") {
        None => Ok(()),
        Some(t) if t == "object" => Ok(()),
        Some(t) => Err(format!("parameter schema type must be \"object\", got {}", t)),
    }
}
