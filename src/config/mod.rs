//! Configuration management for muli
//!
//! Configuration is loaded from `~/.muli/config.json` with environment variable overrides.

mod types;

pub use types::*;

use crate::error::Result;
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the muli configuration directory path (~/.muli)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".muli")
    }

    /// Returns the path to the config file (~/.muli/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Read `~/.muli/config.json`, falling back to defaults when it is absent.
    /// `MULI_<SECTION>_<KEY>` variables are layered on top.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Same as [`Config::load`] for an explicit file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        // Agent
        if let Ok(val) = std::env::var("MULI_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("MULI_AGENT_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("MULI_AGENT_MAX_TOOL_ITERATIONS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tool_iterations = v;
            }
        }
        if let Ok(val) = std::env::var("MULI_AGENT_DATA_DIR") {
            self.agent.data_dir = val;
        }

        // Provider
        if let Ok(val) = std::env::var("MULI_PROVIDERS_API_KEY") {
            self.providers.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("MULI_PROVIDERS_API_BASE") {
            self.providers.api_base = val;
        }

        // Compaction
        if let Ok(val) = std::env::var("MULI_COMPACTION_CONTEXT_LIMIT") {
            if let Ok(v) = val.parse() {
                self.compaction.context_limit = v;
            }
        }

        // Shell
        if let Ok(val) = std::env::var("MULI_SHELL_ENABLE") {
            if let Ok(v) = val.parse() {
                self.shell.enable = v;
            }
        }
        if let Ok(val) = std::env::var("MULI_SHELL_CONTAINER_NAME") {
            self.shell.container_name = val;
        }
    }

    /// Write pretty JSON, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the expanded history directory (resolves ~ to home directory)
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.agent.data_dir)
    }
}

/// `~/x` -> `$HOME/x`; other paths unchanged.
fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from(path);
    }

    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            if let Some(rest) = rest.strip_prefix('/') {
                return home.join(rest);
            }
            if rest.is_empty() {
                return home;
            }
        }
    }

    PathBuf::from(path)
}
