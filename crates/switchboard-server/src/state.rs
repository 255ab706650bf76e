use std::sync::Arc;
use switchboard_core::config::AppConfig;
use switchboard_core::orchestrator::AgentOrchestrator;

/// Shared application state for the server. The orchestrator owns every
/// stateful component (model registry, backends, circuit breaker, context,
/// event bus, tool registry, confirmation middleware); the server is a thin
/// HTTP/WebSocket adapter in front of it.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<AgentOrchestrator>,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Arc<AgentOrchestrator>) -> Self {
        Self { config, orchestrator }
    }
}
