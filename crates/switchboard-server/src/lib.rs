pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;
use switchboard_core::config::AppConfig;
use switchboard_core::orchestrator::AgentOrchestrator;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors_enabled = state.config.server.cors;

    let mut app = Router::new()
        .merge(routes::chat_routes())
        .merge(routes::tool_routes())
        .merge(routes::confirmation_routes())
        .merge(routes::status_routes())
        .merge(routes::event_routes())
        .merge(routes::health_routes())
        .with_state(state);

    app = app.layer(TraceLayer::new_for_http());
    if cors_enabled {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

/// Start the HTTP/WebSocket server, the interface adapter spec.md §6
/// describes as a consumer of `processMessage`/`executeTool`/`getStats`/
/// `healthCheck` — out of the orchestration core proper but part of the
/// ambient stack every deployment needs.
pub async fn serve(config: AppConfig, orchestrator: Arc<AgentOrchestrator>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, orchestrator);
    let router = build_router(state);

    tracing::info!(%addr, "starting switchboard server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
