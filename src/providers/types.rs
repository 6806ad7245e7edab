//! Oracle types for muli
//!
//! This module defines the `LLMProvider` trait, the request options and the
//! response shape. The agent treats the model strictly as a request/response
//! oracle: messages and tool descriptors go in, content and/or tool calls
//! come out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{Message, ToolCall};

/// A tool the oracle may call: name, description and JSON Schema parameters.
///
/// On the wire this becomes `{"type": "function", "function": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The name of the tool (unique within a registry)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema object describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    /// Describe a tool from its name, prose and parameter schema.
    ///
    /// # Example
    /// ```
    /// use muli::providers::ToolDescriptor;
    /// use serde_json::json;
    ///
    /// let tool = ToolDescriptor::new(
    ///     "echo",
    ///     "Echo back the message",
    ///     json!({
    ///         "type": "object",
    ///         "properties": { "message": { "type": "string" } },
    ///         "required": ["message"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "echo");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// A chat-completion backend the agent consults each turn.
///
/// The provider translates between muli's message model and a concrete API.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run one completion over the given history.
    ///
    /// # Arguments
    /// * `messages` - The conversation history
    /// * `tools` - Tools the model may call; empty for plain completions
    /// * `model` - Optional model override (uses default if None)
    /// * `options` - Sampling options
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDescriptor>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// The model used when the caller passes `None`.
    fn default_model(&self) -> &str;

    /// Provider name for logs (e.g. "openai").
    fn name(&self) -> &str;
}

/// Sampling knobs passed through to the backend.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the completion length.
    ///
    /// # Example
    /// ```
    /// use muli::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(1000).with_temperature(0.2);
    /// assert_eq!(options.max_tokens, Some(1000));
    /// assert_eq!(options.temperature, Some(0.2));
    /// ```
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// What the backend returned for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response (empty when the model only calls tools)
    pub content: String,
    /// Tool calls requested by the model, in order
    pub tool_calls: Vec<LLMToolCall>,
    /// Reasoning trace, for models that return one
    pub reasoning_content: Option<String>,
    /// Token usage information (if available)
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// A final answer with no tool requests.
    ///
    /// # Example
    /// ```
    /// use muli::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert_eq!(response.content, "Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert into the assistant message appended to the conversation.
    pub fn into_message(self) -> Message {
        let msg = if self.tool_calls.is_empty() {
            Message::assistant(&self.content)
        } else {
            let calls = self
                .tool_calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    name: tc.name,
                    arguments: tc.arguments,
                })
                .collect();
            Message::assistant_with_tools(&self.content, calls)
        };
        msg.with_reasoning(self.reasoning_content)
    }
}

/// One tool request as parsed from the backend response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl LLMToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_text_response_into_message() {
        let msg = LLMResponse::text("final answer").into_message();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "final answer");
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_tool_response_into_message_keeps_order() {
        let response = LLMResponse::with_tools(
            "checking",
            vec![
                LLMToolCall::new("a", "first", "{}"),
                LLMToolCall::new("b", "second", r#"{"k":1}"#),
            ],
        );
        let msg = response.into_message();
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[1].name, "second");
        assert_eq!(calls[1].arguments, r#"{"k":1}"#);
        assert_eq!(msg.content, "checking");
    }

    #[test]
    fn test_reasoning_carried_into_message() {
        let response = LLMResponse {
            reasoning_content: Some("let me think".into()),
            ..LLMResponse::text("ok")
        };
        let msg = response.into_message();
        assert_eq!(msg.reasoning_content.as_deref(), Some("let me think"));
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(Usage::new(10, 5).total(), 15);
    }
}
