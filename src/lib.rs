//! muli - conversational agent runtime with a sandboxed container shell
//!
//! The agent talks to an OpenAI-compatible model, routes its tool calls to
//! in-process tools or MCP servers, and keeps a persistent pty shell inside a
//! docker container for the model to drive.

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod relay;
pub mod runtime;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentEvent, AgentLoop, ContextManager, ContextState, LoopState};
pub use config::Config;
pub use error::{MuliError, Result, ToolError};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDescriptor, Usage};
pub use session::{ConversationStore, DisplayLog, Message, Role, ToolCall};
pub use tools::{Tool, ToolDispatcher, ToolRegistry};
