//! Session module - conversation state persistence
//!
//! Two files live in the history directory:
//! - `conversation.json`: the model-facing message sequence, rewritten after
//!   every completed turn ([`ConversationStore`])
//! - `screen.json`: what the user was shown, for replay into a UI
//!   ([`DisplayLog`])
//!
//! # Example
//!
//! ```
//! use muli::session::{ConversationStore, Message};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = ConversationStore::new_memory();
//!     store
//!         .save(&[Message::system("You are helpful."), Message::user("Hello!")])
//!         .await
//!         .unwrap();
//!     assert!(store.load().await.unwrap().is_empty());
//! }
//! ```

pub mod display;
pub mod types;

pub use display::{DisplayEntry, DisplayKind, DisplayLog};
pub use types::{Message, Role, ToolCall};

use crate::error::{MuliError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const CONVERSATION_FILE: &str = "conversation.json";

/// Reads and writes the message sequence.
///
/// When created with [`ConversationStore::new_memory`], nothing touches the
/// disk: `save` is a no-op and `load` returns an empty history.
pub struct ConversationStore {
    /// File holding the message array, if persistence is enabled
    path: Option<PathBuf>,
}

impl ConversationStore {
    /// Create a store that persists into `dir/conversation.json`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn with_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: Some(dir.join(CONVERSATION_FILE)),
        })
    }

    /// Create a store without persistence.
    pub fn new_memory() -> Self {
        Self { path: None }
    }

    /// Path of the conversation file, if persistence is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the saved history.
    ///
    /// A missing file is an empty history. A file that exists but cannot be
    /// parsed is an error: silently starting over would destroy it on the
    /// next save.
    pub async fn load(&self) -> Result<Vec<Message>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| {
            MuliError::Session(format!(
                "conversation history at {} is unreadable: {}",
                path.display(),
                e
            ))
        })
    }

    /// Overwrite the saved history with `messages`.
    pub async fn save(&self, messages: &[Message]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(messages)?;
        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), messages = messages.len(), "Conversation saved");
        Ok(())
    }

    /// Remove the saved history.
    pub async fn clear(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if path.exists() {
                tokio::fs::remove_file(path).await?;
            }
        }
        Ok(())
    }
}
