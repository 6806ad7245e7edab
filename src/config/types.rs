//! Configuration type definitions for muli
//!
//! All types implement serde traits for JSON serialization and have sensible defaults,
//! so a partial `config.json` only needs to name the fields it changes.

use serde::{Deserialize, Serialize};

/// Main configuration struct for muli
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent loop settings (model, prompt, iteration bound)
    pub agent: AgentConfig,
    /// Context compaction configuration
    pub compaction: CompactionConfig,
    /// Oracle endpoint configuration
    pub providers: ProviderConfig,
    /// Container shell and port-forward tools
    pub shell: ShellConfig,
    /// MCP (Model Context Protocol) server configuration
    pub mcp: McpConfig,
    /// Logging output configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier sent to the oracle
    pub model: String,
    /// System prompt placed first in every conversation
    pub system_prompt: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum model/tool round trips for a single user turn
    pub max_tool_iterations: u32,
    /// Characters of a tool result shown on the console
    pub console_preview_chars: usize,
    /// Directory holding `conversation.json` and `screen.json`
    pub data_dir: String,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools, \
including an interactive shell inside an isolated container. \
Use tools when they help; keep answers concise.";

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 50,
            console_preview_chars: 500,
            data_dir: "~/.muli/history".to_string(),
        }
    }
}

// ============================================================================
// Compaction Configuration
// ============================================================================

/// Context compaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Whether automatic context compaction is enabled.
    pub enabled: bool,
    /// Estimated-token budget; exceeding it after a turn triggers compaction.
    pub context_limit: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            context_limit: 100_000,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// OpenAI-compatible oracle endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (also read from `MULI_PROVIDERS_API_KEY`)
    pub api_key: Option<String>,
    /// Base URL; `/chat/completions` is appended
    pub api_base: String,
    /// HTTP timeout for a single oracle call
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

// ============================================================================
// Shell Configuration
// ============================================================================

/// Settings for the container shell, port-forward and file copy tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Administrative gate; every shell tool refuses to act when false.
    pub enable: bool,
    /// Docker container the session attaches to
    pub container_name: String,
    /// Free-form host/container mount description added to the tool description
    pub mount_mapping: Option<String>,
    /// Delay after spawning the shell before the banner is drained
    pub settle_ms: u64,
    /// Program launched as `<program> relay ...`; defaults to the current executable
    pub relay_program: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable: false,
            container_name: "ai_shell_container".to_string(),
            mount_mapping: None,
            settle_ms: 1000,
            relay_program: None,
        }
    }
}

// ============================================================================
// MCP Configuration
// ============================================================================

/// MCP (Model Context Protocol) server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// MCP server definitions.
    pub servers: Vec<McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Human-readable server name (used in logs).
    pub name: String,
    /// Server URL endpoint.
    pub url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 {
    30
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Single-line `[LEVEL] target message {fields}` output
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Append logs to this file instead of stderr
    pub file: Option<String>,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            level: "info".to_string(),
        }
    }
}
