//! Tool dispatcher for muli
//!
//! Turns one model-issued tool call into result text. Every failure mode
//! (bad arguments, unknown name, failing body, unreachable server) comes back
//! as an `Error: ...` string, so a misbehaving tool never aborts a turn.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::ToolError;

use super::registry::{ToolRegistry, ToolRoute};

/// Text returned when a remote tool produced no text content.
pub const NO_OUTPUT: &str = "(no output)";

/// Routes tool calls through a [`ToolRegistry`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use muli::tools::{EchoTool, ToolDispatcher, ToolRegistry};
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register_local(Arc::new(EchoTool));
/// let dispatcher = ToolDispatcher::new(registry);
///
/// assert_eq!(dispatcher.invoke("echo", r#"{"message": "hi"}"#).await, "hi");
/// assert_eq!(
///     dispatcher.invoke("nope", "{}").await,
///     "Error: ToolNotFound: no tool named 'nope'"
/// );
/// # });
/// ```
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Run a tool call and return the text for the `tool` message.
    pub async fn invoke(&self, name: &str, raw_arguments: &str) -> String {
        let start = Instant::now();
        let outcome = self.try_invoke(name, raw_arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(text) => {
                info!(tool = %name, duration_ms, success = true, "Tool executed");
                text
            }
            Err(e) => {
                warn!(tool = %name, duration_ms, success = false, error = %e, "Tool failed");
                e.to_result_text()
            }
        }
    }

    async fn try_invoke(&self, name: &str, raw_arguments: &str) -> Result<String, ToolError> {
        let args = parse_arguments(name, raw_arguments)?;
        let route = self
            .registry
            .route(name)
            .ok_or_else(|| ToolError::ToolNotFound(name.to_string()))?;

        match route {
            ToolRoute::Local(tool) => tool.execute(args).await,
            ToolRoute::Remote {
                client,
                remote_name,
            } => {
                let result = client
                    .call_tool(remote_name, args)
                    .await
                    .map_err(|e| ToolError::execution(e.to_string()))?;
                let mut text = result.text();
                if text.is_empty() {
                    text = NO_OUTPUT.to_string();
                }
                if result.is_error {
                    Ok(format!("Error: {}", text))
                } else {
                    Ok(text)
                }
            }
        }
    }
}

/// Parse raw call arguments. Blank input means no arguments.
fn parse_arguments(name: &str, raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let format_error = |detail: String| ToolError::ArgumentFormat {
        tool: name.to_string(),
        detail,
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format_error(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(format_error(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
