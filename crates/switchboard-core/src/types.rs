//! Shared value types used across the orchestration pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Interface the message arrived on or was produced for.
    #[serde(default)]
    pub interface_tag: InterfaceTag,
    /// Model that produced this message, if role is Assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// Tool names invoked while producing this message, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    /// Execution latency in milliseconds, if this message came from a model call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_elapsed_ms: Option<u64>,
}

impl Message {
    pub fn user(content: impl Into<String>, interface_tag: InterfaceTag) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            interface_tag,
            model_used: None,
            tools_used: Vec::new(),
            exec_elapsed_ms: None,
        }
    }

    pub fn assistant(content: impl Into<String>, interface_tag: InterfaceTag) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            interface_tag,
            model_used: None,
            tools_used: Vec::new(),
            exec_elapsed_ms: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::System,
            content: content.into(),
            timestamp: Utc::now(),
            interface_tag: InterfaceTag::Unknown,
            model_used: None,
            tools_used: Vec::new(),
            exec_elapsed_ms: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    pub fn with_tools_used(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }

    pub fn with_exec_elapsed_ms(mut self, ms: u64) -> Self {
        self.exec_elapsed_ms = Some(ms);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// The client surface a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceTag {
    Telegram,
    Web,
    Slack,
    Api,
    Cli,
    #[default]
    Unknown,
}

/// User-supplied preferences that shape prompt rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub terse: bool,
}

/// Context passed in alongside a request from an interface adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub preferences: UserPreferences,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl UserContext {
    pub fn has_vision_attachment(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// The closed taxonomy of error kinds that cross a public API boundary.
///
/// Internal components propagate `AgentError` (see `error.rs`); at the
/// boundaries named in spec.md §7 an `AgentError` is classified into one
/// of these before being handed back to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Authz,
    RateLimit,
    ToolNotFound,
    ToolValidation,
    ToolDenied,
    ToolExecution,
    BackendOpen,
    BackendUnavailable,
    Timeout,
    Transport,
    ServerError,
    Auth,
    BadRequest,
    AllModelsFailed,
    Cancelled,
}

impl ErrorKind {
    /// Whether this kind should increment a circuit breaker's failure
    /// counter (spec.md §4.C: only TIMEOUT, TRANSPORT, SERVER_ERROR count).
    pub fn counts_toward_circuit_breaker(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Transport | ErrorKind::ServerError
        )
    }
}
