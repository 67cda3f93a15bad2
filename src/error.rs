//! Error types for the Claude bridge

use thiserror::Error;

/// Main error type for the Claude bridge
///
/// Every variant renders as a human-readable string; the WebSocket layer
/// forwards the `Display` output to clients verbatim.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Claude Code CLI not found or not installed
    #[error("Claude Code CLI not found: {0}")]
    CliNotFound(String),

    /// Working directory rejected before any process was spawned
    #[error("Invalid working directory: {0}")]
    InvalidWorkDir(String),

    /// The CLI subprocess could not be started
    #[error("Failed to start Claude Code: {0}")]
    Spawn(String),

    /// No live session with this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The connection has no session bound to it
    #[error("No active session")]
    NoActiveSession,

    /// Command issued against a session that is no longer active
    #[error("Session {0} is not active")]
    SessionNotActive(String),

    /// Writing to the subprocess failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A client command was missing or carried an invalid field
    #[error("Invalid request: {0}")]
    Validation(String),

    /// JSON decode error when parsing CLI output or client input
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// Message parse error with optional raw data
    #[error("Message parse error: {message}")]
    MessageParse {
        /// Error message
        message: String,
        /// Raw message data that failed to parse
        data: Option<serde_json::Value>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create a CLI not found error
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::CliNotFound(
            "Claude Code not found. Install with:\n\
             npm install -g @anthropic-ai/claude-code\n\
             \n\
             Or pass --cli-path (CLAUDE_BRIDGE_CLI_PATH) to the claude executable"
                .to_string(),
        )
    }

    /// Create an invalid working directory error
    pub fn invalid_work_dir(msg: impl Into<String>) -> Self {
        Self::InvalidWorkDir(msg.into())
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    /// Create a session not active error
    pub fn session_not_active(session_id: impl Into<String>) -> Self {
        Self::SessionNotActive(session_id.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a message parse error
    pub fn message_parse(msg: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::MessageParse {
            message: msg.into(),
            data,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
