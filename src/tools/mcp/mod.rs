//! MCP (Model Context Protocol) remote tools.
//!
//! Each configured server becomes one [`McpProvider`]. At registry build time
//! it performs the handshake, lists the server's tools, and turns every entry
//! into a remote route. Schemas are kept as the server sent them, minus the
//! top-level metadata keys (`$schema`, `$id`, `$comment`) the oracle rejects.

pub mod client;
pub mod protocol;

pub use client::McpClient;
pub use protocol::McpTool;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::McpServerConfig;
use crate::error::Result;
use crate::providers::ToolDescriptor;
use crate::tools::registry::{Capability, CapabilityProvider, ToolRoute};

/// Capability provider backed by one MCP server.
pub struct McpProvider {
    client: Arc<McpClient>,
}

impl McpProvider {
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }

    pub fn from_config(server: &McpServerConfig) -> Self {
        Self::new(Arc::new(McpClient::new(
            &server.name,
            &server.url,
            server.timeout_secs,
        )))
    }
}

#[async_trait]
impl CapabilityProvider for McpProvider {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn load(&self) -> Result<Vec<Capability>> {
        self.client.initialize().await?;
        let tools = self.client.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|tool| remote_capability(&self.client, tool))
            .collect())
    }
}

/// Turn one advertised tool into a registry entry routed to `client`.
pub fn remote_capability(client: &Arc<McpClient>, tool: McpTool) -> Capability {
    Capability {
        descriptor: ToolDescriptor {
            name: tool.name.clone(),
            description: tool.description.unwrap_or_default(),
            parameters: sanitize_schema(tool.input_schema),
        },
        route: ToolRoute::Remote {
            client: Arc::clone(client),
            remote_name: tool.name,
        },
    }
}

/// Top-level keys that only describe the schema document itself.
const SCHEMA_METADATA_KEYS: [&str; 3] = ["$schema", "$id", "$comment"];

/// Drop top-level metadata keys; `$defs` stays so `$ref`s still resolve.
/// A missing schema becomes an empty object schema.
pub fn sanitize_schema(schema: Option<Value>) -> Value {
    match schema {
        Some(Value::Object(mut map)) => {
            map.retain(|key, _| !SCHEMA_METADATA_KEYS.contains(&key.as_str()));
            Value::Object(map)
        }
        Some(Value::Null) | None => json!({"type": "object", "properties": {}}),
        Some(other) => other,
    }
}
