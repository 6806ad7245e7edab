//! Base64 codec tools.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::error::ToolError;

use super::types::{required_str, ParamKind, Tool, ToolParam, ToolResult};

/// Encode UTF-8 text as standard base64.
pub struct Base64EncodeTool;

#[async_trait]
impl Tool for Base64EncodeTool {
    fn name(&self) -> &str {
        "base64_encode"
    }

    fn description(&self) -> &str {
        "Encode text as base64"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required("text", ParamKind::String, "Text to encode")]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        Ok(STANDARD.encode(required_str(&args, "text")?))
    }
}

/// Decode standard base64 back to UTF-8 text.
pub struct Base64DecodeTool;

#[async_trait]
impl Tool for Base64DecodeTool {
    fn name(&self) -> &str {
        "base64_decode"
    }

    fn description(&self) -> &str {
        "Decode base64 data to text"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required("data", ParamKind::String, "Base64 data to decode")]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let data = required_str(&args, "data")?;
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| ToolError::execution(format!("invalid base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|_| ToolError::execution("decoded data is not valid UTF-8"))
    }
}
