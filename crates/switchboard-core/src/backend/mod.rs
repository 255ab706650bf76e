//! Backend Adapter (spec.md §4.B) — the polymorphic transport layer the
//! Execution Engine calls through. Each adapter wraps one concrete wire
//! protocol behind a single async trait.

mod cloud_anthropic;
mod cloud_openai;
mod local_chat;
mod local_generate;

pub use cloud_anthropic::CloudAnthropicBackend;
pub use cloud_openai::CloudOpenAiBackend;
pub use local_chat::LocalChatBackend;
pub use local_generate::LocalGenerateBackend;

use async_trait::async_trait;
use std::time::Duration;

/// Failure taxonomy a `Backend` maps its transport errors into. Only
/// `Timeout`, `Transport`, and `ServerError` count toward circuit-breaker
/// failures (spec.md §4.C) — `Auth` and `BadRequest` are caller errors.
#[derive(Debug, Clone)]
pub enum BackendError {
    Timeout,
    Transport(String),
    Auth(String),
    BadRequest(String),
    ServerError { status: u16, message: String },
    Unavailable(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Timeout => write!(f, "request timed out"),
            BackendError::Transport(msg) => write!(f, "transport error: {msg}"),
            BackendError::Auth(msg) => write!(f, "auth error: {msg}"),
            BackendError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            BackendError::ServerError { status, message } => {
                write!(f, "server error ({status}): {message}")
            }
            BackendError::Unavailable(msg) => write!(f, "backend unavailable: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl BackendError {
    pub fn counts_toward_circuit_breaker(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout | BackendError::Transport(_) | BackendError::ServerError { .. }
        )
    }
}

/// A successful generation.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub token_count: Option<u32>,
    pub elapsed: Duration,
}

/// Parameters for one `generate` call, independent of the model selected.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub model_name: &'a str,
    pub system_prompt: Option<&'a str>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A concrete wire protocol for talking to one model-serving endpoint.
///
/// Implementors MUST be safe under concurrent calls from multiple tasks;
/// the HTTP client is built once and reused (spec.md §4.B).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError>;

    /// Cheap liveness probe. Callers are expected to cache the result for a
    /// short window (spec.md §4.F: "cached ≤1s") rather than call this per
    /// request.
    async fn is_available(&self) -> bool;

    /// Release any held transport resources. A no-op for adapters backed by
    /// a pooled `reqwest::Client`, since the pool is dropped with the
    /// adapter itself.
    async fn close(&self);
}
