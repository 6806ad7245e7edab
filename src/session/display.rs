//! Display log: a replayable record of what the console showed.
//!
//! Independent of the model-facing conversation. Tool output is stored here
//! as the truncated preview the user saw, and compaction never touches it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

const SCREEN_FILE: &str = "screen.json";

/// How an entry should be rendered on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Text,
    Markdown,
    Tool,
}

/// One rendered item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEntry {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub role: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: DisplayKind,
}

/// Append-only display log, rewritten to `screen.json` after each entry.
pub struct DisplayLog {
    path: Option<PathBuf>,
    entries: Vec<DisplayEntry>,
}

impl DisplayLog {
    /// Open (or start) the log in `dir`. An unreadable existing file is
    /// replaced rather than treated as fatal.
    pub fn with_dir(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SCREEN_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding unreadable display log");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    /// Log kept only in memory.
    pub fn new_memory() -> Self {
        Self {
            path: None,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    /// Record an entry and flush. Write failures are logged, never returned.
    pub async fn log(&mut self, role: &str, content: &str, kind: DisplayKind) {
        self.entries.push(DisplayEntry {
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            role: role.to_string(),
            content: content.to_string(),
            kind,
        });

        let Some(path) = &self.path else {
            return;
        };
        let content = match serde_json::to_string_pretty(&self.entries) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to serialize display log");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, content).await {
            warn!(path = %path.display(), error = %e, "Failed to write display log");
        }
    }
}
