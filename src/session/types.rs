//! Conversation types for muli
//!
//! This module defines the message model shared by the agent loop, the
//! context manager and the oracle adapters: messages, roles, and tool calls.

use serde::{Deserialize, Serialize};

/// A single message in a conversation.
///
/// Messages can be from users, assistants, system prompts, or tool results.
/// An empty `content` stands for the wire-level `null` (an assistant turn that
/// only requests tools).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Tool calls made by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (for tool results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Reasoning trace returned by thinking models. Volatile: it is kept
    /// while a turn is in flight and cleared when the user speaks again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    /// A turn typed by the human.
    ///
    /// # Example
    /// ```
    /// use muli::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    /// A plain assistant reply.
    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Prompt text, or the summary left behind by compaction.
    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Output of one tool invocation, linked back to the request by id.
    ///
    /// # Example
    /// ```
    /// use muli::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_123", "42");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    /// ```
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// An assistant turn that asks for tools to be run.
    ///
    /// # Example
    /// ```
    /// use muli::session::{Message, ToolCall};
    ///
    /// let call = ToolCall::new("c1", "echo", r#"{"x":42}"#);
    /// let msg = Message::assistant_with_tools("", vec![call]);
    /// assert!(msg.has_tool_calls());
    /// ```
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Attach a reasoning trace.
    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning_content = reasoning.filter(|r| !r.is_empty());
        self
    }

    /// True when the turn carries at least one tool request.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the oracle.
///
/// Produced by the model, never by the agent; each one is answered by exactly
/// one tool result message carrying the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier assigned by the oracle
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_links_call_id() {
        let msg = Message::tool_result("c1", "42");
        assert!(msg.is_tool_result());
        assert!(!msg.has_tool_calls());
        assert!(!Message::assistant("42").is_tool_result());
    }

    #[test]
    fn test_tool_request_keeps_arguments_verbatim() {
        let call = ToolCall::new("c7", "send_shell_input", r#"{"text": "ls -la\n"}"#);
        let msg = Message::assistant_with_tools("", vec![call.clone()]);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls.as_deref(), Some(&[call][..]));
    }

    #[test]
    fn test_empty_tool_calls_is_not_a_tool_request() {
        let msg = Message::assistant_with_tools("done", vec![]);
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_with_reasoning_ignores_empty() {
        let msg = Message::assistant("hi").with_reasoning(Some(String::new()));
        assert!(msg.reasoning_content.is_none());
        let msg = Message::assistant("hi").with_reasoning(Some("thinking".into()));
        assert_eq!(msg.reasoning_content.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_reasoning_survives_persistence() {
        let msg = Message::assistant("answer").with_reasoning(Some("step 1".into()));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""reasoning_content":"step 1""#));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_roles_use_lowercase_names() {
        for (role, name) in [
            (Role::System, "system"),
            (Role::User, "user"),
            (Role::Assistant, "assistant"),
            (Role::Tool, "tool"),
        ] {
            assert_eq!(role.to_string(), name);
            assert_eq!(serde_json::to_value(role).unwrap(), name);
        }
    }

    #[test]
    fn test_user_turn_serializes_without_optional_fields() {
        let value = serde_json::to_value(Message::user("Hello")).unwrap();
        assert_eq!(value, serde_json::json!({"role": "user", "content": "Hello"}));
    }

    #[test]
    fn test_null_content_deserializes_as_empty() {
        let msg: Message = serde_json::from_str(
            r#"{"role":"assistant","content":null,"tool_calls":[{"id":"c1","name":"echo","arguments":"{}"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.content, "");
        assert!(msg.has_tool_calls());
    }
}
