use crate::types::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool validation error: {tool_name}: {message}")]
    ToolValidation { tool_name: String, message: String },

    #[error("Tool invocation denied: {0}")]
    ToolDenied(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Schema build error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("All models in the fallback chain failed: {0}")]
    AllModelsFailed(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Classify this error into the closed taxonomy that crosses a public
    /// API boundary (spec.md §7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            AgentError::ToolValidation { .. } => ErrorKind::ToolValidation,
            AgentError::ToolDenied(_) => ErrorKind::ToolDenied,
            AgentError::ToolExecution { .. } => ErrorKind::ToolExecution,
            AgentError::AllModelsFailed(_) => ErrorKind::AllModelsFailed,
            AgentError::Cancelled => ErrorKind::Cancelled,
            AgentError::Http(_) | AgentError::Backend(_) => ErrorKind::Transport,
            _ => ErrorKind::ToolExecution,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
