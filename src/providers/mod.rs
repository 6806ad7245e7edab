//! Providers module - the model oracle boundary
//!
//! The agent only sees the [`LLMProvider`] trait. [`OpenAIProvider`] speaks the
//! Chat Completions wire format; tests plug in scripted providers.

pub mod openai;
mod types;

pub use openai::OpenAIProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDescriptor, Usage};
