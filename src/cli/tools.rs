//! Tools CLI command handler: tool discovery.

use anyhow::Result;
use muli::config::Config;

use super::common::{build_registry, shutdown};

/// List every registered tool with its description.
pub(crate) async fn cmd_tools(config: Config) -> Result<()> {
    let (registry, container) = build_registry(&config).await;

    println!("Registered tools ({}):", registry.len());
    println!();
    for descriptor in registry.descriptors() {
        println!("  {:<24} {}", descriptor.name, first_line(&descriptor.description));
    }
    println!();
    if !config.shell.enable {
        println!("Container tools are disabled. Set \"shell\": {{\"enable\": true}} to use them.");
    }

    shutdown(&container).await;
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
