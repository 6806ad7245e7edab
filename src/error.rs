//! Error types for muli
//!
//! Two layers of errors live here:
//!
//! - [`ToolError`] is what a tool body returns. It never escapes a
//!   conversation turn: the dispatcher collapses it into the text the model
//!   sees as the tool result.
//! - [`MuliError`] covers everything else (config, provider, persistence) and
//!   is what library functions return through [`Result`].

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Classification of oracle HTTP failures.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403: invalid API key
    Auth(String),
    /// 429: rate limit or quota exceeded
    RateLimit(String),
    /// 5xx: server-side failures
    ServerError(String),
    /// 400: malformed request
    InvalidRequest(String),
    /// 404: unknown model or endpoint
    ModelNotFound(String),
    /// Anything else
    Unknown(String),
}

impl ProviderError {
    /// Classify an HTTP status code and body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => ProviderError::Auth(body),
            429 => ProviderError::RateLimit(body),
            400 => ProviderError::InvalidRequest(body),
            404 => ProviderError::ModelNotFound(body),
            500..=599 => ProviderError::ServerError(body),
            _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl From<ProviderError> for MuliError {
    fn from(err: ProviderError) -> Self {
        MuliError::ProviderTyped(err)
    }
}

// ============================================================================
// Tool Errors
// ============================================================================

/// Failure of a single tool invocation.
///
/// The `Display` output names the error kind so the model can tell a typo in
/// a tool name apart from a tool that ran and failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The raw arguments were not a JSON object.
    #[error("ArgumentFormat: arguments for '{tool}' are not valid JSON: {detail}")]
    ArgumentFormat { tool: String, detail: String },

    /// No local or remote route exists for the name.
    #[error("ToolNotFound: no tool named '{0}'")]
    ToolNotFound(String),

    /// The tool body ran and failed.
    #[error("Execution: {0}")]
    Execution(String),

    /// The capability is switched off in config.
    #[error("{0}")]
    Disabled(String),

    /// The target container is absent or stopped.
    #[error("EnvironmentNotReady: {0}")]
    EnvironmentNotReady(String),

    /// The host port already has an active forward.
    #[error("DuplicatePort: Host port {0} is already being forwarded.")]
    DuplicatePort(u16),

    /// The host port has no active forward.
    #[error("PortNotFound: No active forwarding found on host port {0}.")]
    PortNotFound(u16),
}

impl ToolError {
    /// Shorthand for [`ToolError::Execution`].
    pub fn execution(msg: impl Into<String>) -> Self {
        ToolError::Execution(msg.into())
    }

    /// Render as the text delivered to the model in place of a result.
    pub fn to_result_text(&self) -> String {
        format!("Error: {}", self)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for muli operations.
#[derive(Error, Debug)]
pub enum MuliError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped oracle failures (bad response shape, empty choices, ...)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Oracle HTTP failure with status classification.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool failures that escape a turn (only outside the dispatcher).
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Conversation persistence errors (unreadable history, bad state, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Summarisation failed; the caller keeps the history uncompacted.
    #[error("Compaction failed: {0}")]
    CompactionFailed(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MCP (Model Context Protocol) errors (server communication, protocol violations)
    #[error("MCP error: {0}")]
    Mcp(String),
}

/// A specialized `Result` type for muli operations.
pub type Result<T> = std::result::Result<T, MuliError>;
