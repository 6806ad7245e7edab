//! Agent module - the conversation loop and context budget handling
//!
//! # Architecture
//!
//! ```text
//!   user input
//!       │
//!       ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  AgentLoop  │────>│ LLMProvider │
//! │             │<────│  (oracle)   │
//! └─────────────┘     └─────────────┘
//!    │       │
//!    │       ▼
//!    │  ┌────────────────┐     ┌──────────────┐
//!    │  │ ToolDispatcher │────>│ ToolRegistry │──> local tools / MCP servers
//!    │  └────────────────┘     └──────────────┘
//!    ▼
//! ┌────────────────┐   ┌───────────────────┐
//! │ ContextManager │   │ ConversationStore │
//! │  (compaction)  │   │   + DisplayLog    │
//! └────────────────┘   └───────────────────┘
//! ```

mod context;
mod r#loop;

pub use context::{ContextManager, ContextState, SUMMARY_MARKER};
pub use r#loop::{AgentEvent, AgentLoop, LoopState};
