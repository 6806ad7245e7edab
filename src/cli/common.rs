//! Shared wiring for CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use muli::agent::AgentLoop;
use muli::config::Config;
use muli::providers::OpenAIProvider;
use muli::runtime::DockerEnvironment;
use muli::session::{ConversationStore, DisplayLog};
use muli::tools::{
    builtin_tools, container_tools, mcp_providers, CapabilityProvider, ContainerTools,
    LocalProvider, ToolRegistry,
};

/// Build the registry from the built-in, container and MCP providers.
///
/// The container tools are returned alongside so the caller can tear down the
/// shell and relays on exit.
pub(crate) async fn build_registry(config: &Config) -> (ToolRegistry, ContainerTools) {
    let mut container = container_tools(Arc::new(DockerEnvironment::new()), config);
    let tools = std::mem::take(&mut container.tools);

    let mut providers: Vec<Arc<dyn CapabilityProvider>> = vec![
        Arc::new(LocalProvider::new("builtin", builtin_tools())),
        Arc::new(LocalProvider::new("container", tools)),
    ];
    providers.extend(mcp_providers(config));

    let registry = ToolRegistry::build(providers).await;
    info!(tools = registry.len(), "Tool registry ready");
    (registry, container)
}

/// Create the agent with persistent history, falling back to memory.
pub(crate) async fn create_agent(config: &Config) -> Result<(AgentLoop, ContainerTools)> {
    let provider = OpenAIProvider::from_config(config)
        .with_context(|| "Failed to configure the model provider")?;
    let (registry, container) = build_registry(config).await;

    let data_dir = config.data_dir();
    let store = ConversationStore::with_dir(&data_dir).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to create persistent conversation store, using in-memory");
        ConversationStore::new_memory()
    });
    let display = DisplayLog::with_dir(&data_dir).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to open display log, using in-memory");
        DisplayLog::new_memory()
    });

    let mut agent = AgentLoop::new(Arc::new(provider), registry, store, display, config);
    agent
        .load_history()
        .await
        .with_context(|| format!("Failed to load history from {}", data_dir.display()))?;
    Ok((agent, container))
}

/// Kill the shell and every relay.
pub(crate) async fn shutdown(container: &ContainerTools) {
    container.broker.lock().await.restart().await;
    container.relay.lock().await.close_all().await;
}
