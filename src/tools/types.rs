//! Tool types for muli
//!
//! This module defines the `Tool` trait that every in-process capability
//! implements, and the declarative parameter list the JSON Schema shown to the
//! model is derived from.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::providers::ToolDescriptor;

/// Outcome of a tool body: the result text, or a typed failure that the
/// dispatcher turns into text for the model.
pub type ToolResult = std::result::Result<String, ToolError>;

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    /// List-like container
    Array,
    /// Map-like container
    Object,
}

impl ParamKind {
    /// The JSON Schema `type` keyword for this kind.
    pub fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

/// One declared parameter of a local tool.
///
/// A parameter without a default is required.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParam {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub default: Option<Value>,
}

impl ToolParam {
    /// A parameter the model must always supply.
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            default: None,
        }
    }

    /// A parameter that falls back to `default` when omitted.
    pub fn optional(
        name: &'static str,
        kind: ParamKind,
        description: &'static str,
        default: Value,
    ) -> Self {
        Self {
            name,
            kind,
            description,
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Build the JSON Schema object for a parameter list.
///
/// # Example
/// ```
/// use muli::tools::{schema_from_params, ParamKind, ToolParam};
/// use serde_json::json;
///
/// let schema = schema_from_params(&[
///     ToolParam::required("text", ParamKind::String, "Text to send"),
///     ToolParam::optional("timeout_seconds", ParamKind::Number, "Wait time", json!(1)),
/// ]);
/// assert_eq!(schema["properties"]["text"]["type"], "string");
/// assert_eq!(schema["required"], json!(["text"]));
/// ```
pub fn schema_from_params(params: &[ToolParam]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(param.kind.json_type()));
        if !param.description.is_empty() {
            prop.insert("description".into(), json!(param.description));
        }
        if let Some(default) = &param.default {
            prop.insert("default".into(), default.clone());
        }
        properties.insert(param.name.to_string(), Value::Object(prop));
        if param.is_required() {
            required.push(json!(param.name));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Trait that all in-process tools implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use muli::tools::{ParamKind, Tool, ToolParam, ToolResult};
///
/// struct Shout;
///
/// #[async_trait]
/// impl Tool for Shout {
///     fn name(&self) -> &str { "shout" }
///     fn description(&self) -> &str { "Upper-case the text" }
///     fn params(&self) -> Vec<ToolParam> {
///         vec![ToolParam::required("text", ParamKind::String, "Text to shout")]
///     }
///     async fn execute(&self, args: Value) -> ToolResult {
///         Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool. Unique within a registry.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// Declared parameters.
    fn params(&self) -> Vec<ToolParam>;

    /// JSON Schema for the parameters, derived from [`Tool::params`].
    fn parameters(&self) -> Value {
        schema_from_params(&self.params())
    }

    /// Run the tool with already-parsed arguments.
    async fn execute(&self, args: Value) -> ToolResult;

    /// The descriptor the registry publishes for this tool.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters())
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Fetch a required string argument.
pub fn required_str<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::execution(format!("missing required string argument '{}'", key)))
}

/// Fetch an optional string argument; JSON `null` counts as absent.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Fetch a port number, accepting both JSON numbers and numeric strings.
pub fn port_arg(args: &Value, key: &str) -> std::result::Result<Option<u16>, ToolError> {
    let Some(value) = args.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(p) if p <= u16::MAX as u64 => Ok(Some(p as u16)),
        _ => Err(ToolError::execution(format!(
            "'{}' must be a port number between 0 and 65535, got {}",
            key, value
        ))),
    }
}

/// Fetch a list of strings.
pub fn string_list(args: &Value, key: &str) -> std::result::Result<Vec<String>, ToolError> {
    let items = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::execution(format!("'{}' must be a list of strings", key)))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ToolError::execution(format!("'{}' must contain only strings", key)))
        })
        .collect()
}
