//! Echo tool, useful for exercising the tool pipeline.

use async_trait::async_trait;
use serde_json::Value;

use super::types::{required_str, ParamKind, Tool, ToolParam, ToolResult};

/// Echoes back the `message` argument.
///
/// # Example
///
/// ```rust
/// use muli::tools::{EchoTool, Tool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let result = EchoTool.execute(json!({"message": "Hello"})).await;
/// assert_eq!(result.unwrap(), "Hello");
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given message unchanged"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required(
            "message",
            ParamKind::String,
            "Text to return",
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        Ok(required_str(&args, "message")?.to_string())
    }
}
