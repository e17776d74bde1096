//! Error types for the agent session engine

use thiserror::Error;

/// Main error type for the agent session engine
#[derive(Error, Debug)]
pub enum AgentError {
    /// Scratch workspace could not be created or read
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// A relative path tried to leave its workspace root
    #[error("Path escapes workspace root: {0}")]
    PathEscape(String),

    /// Model-interaction transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Tool table lookup or execution failure
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// Tool name
        tool: String,
        /// Error message
        message: String,
    },

    /// Tool name not present in the tool table
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Language-server collaborator failure
    #[error("Language server error: {0}")]
    LanguageServer(String),

    /// Session snapshot could not be saved, loaded or cleared
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Checkpoint capture or restore failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Datamapper service failure
    #[error("Datamapper error: {0}")]
    Datamapper(String),

    /// A generation is already streaming for this session
    #[error("A generation is already in progress")]
    GenerationInProgress,

    /// The session is not in a state that allows the operation
    #[error("Not allowed while {0}")]
    InvalidState(String),

    /// No pending decision is waiting under the given request id
    #[error("No pending request: {0}")]
    RequestNotFound(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for agent session operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create a workspace error
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    /// Create a path escape error
    pub fn path_escape(path: impl Into<String>) -> Self {
        Self::PathEscape(path.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a tool error
    pub fn tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create an unknown tool error
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool(name.into())
    }

    /// Create a language server error
    pub fn language_server(msg: impl Into<String>) -> Self {
        Self::LanguageServer(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a datamapper error
    pub fn datamapper(msg: impl Into<String>) -> Self {
        Self::Datamapper(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a request not found error
    pub fn request_not_found(id: impl Into<String>) -> Self {
        Self::RequestNotFound(id.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Short message suitable for showing to the user
    ///
    /// Never includes source chains or debug formatting; those go to logs
    /// and telemetry only.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) | Self::LanguageServer(msg) | Self::Datamapper(msg) => {
                msg.clone()
            }
            Self::Tool { tool, .. } => format!("The '{tool}' tool failed"),
            Self::Io(_) | Self::Workspace(_) | Self::PathEscape(_) => {
                "Failed to prepare the workspace for generation".to_string()
            }
            Self::GenerationInProgress => "A generation is already in progress".to_string(),
            Self::Timeout(_) => "The request timed out".to_string(),
            other => other.to_string(),
        }
    }

    /// Stable short name of the error kind, used as a telemetry property
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "workspace",
            Self::PathEscape(_) => "path_escape",
            Self::Transport(_) => "transport",
            Self::Tool { .. } => "tool",
            Self::UnknownTool(_) => "unknown_tool",
            Self::LanguageServer(_) => "language_server",
            Self::Persistence(_) => "persistence",
            Self::Checkpoint(_) => "checkpoint",
            Self::Datamapper(_) => "datamapper",
            Self::GenerationInProgress => "generation_in_progress",
            Self::InvalidState(_) => "invalid_state",
            Self::RequestNotFound(_) => "request_not_found",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
