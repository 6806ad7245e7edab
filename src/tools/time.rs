//! Current-time tool.

use async_trait::async_trait;
use chrono::{FixedOffset, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::ToolError;

use super::types::{ParamKind, Tool, ToolParam, ToolResult};

/// Reports the current time as RFC 3339 at a fixed UTC offset.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally shift to a UTC offset in hours (e.g. 8 or -5.5)."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::optional(
            "timezone_offset_hours",
            ParamKind::Number,
            "Offset from UTC in hours",
            json!(0),
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let hours = match args.get("timezone_offset_hours") {
            None | Some(Value::Null) => 0.0,
            Some(v) => v.as_f64().ok_or_else(|| {
                ToolError::execution(format!("'timezone_offset_hours' must be a number, got {}", v))
            })?,
        };
        let offset = offset_from_hours(hours)?;
        Ok(Utc::now()
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false))
    }
}

fn offset_from_hours(hours: f64) -> Result<FixedOffset, ToolError> {
    let seconds = (hours * 3600.0).round();
    if !seconds.is_finite() || seconds.abs() >= 86_400.0 {
        return Err(ToolError::execution(format!(
            "timezone offset {} is out of range (-24, 24)",
            hours
        )));
    }
    FixedOffset::east_opt(seconds as i32)
        .ok_or_else(|| ToolError::execution(format!("invalid timezone offset {}", hours)))
}
