//! HTTP/WebSocket routes implementing the external interface contract
//! (spec.md §6): `processMessage`, `executeTool`, `getToolList`,
//! `getStats`, `healthCheck`, confirmation approve/deny, and a streaming
//! events feed. Response/error shapes follow `agent-server::routes`'
//! `Json<T>` + `(StatusCode, String)` error tuple convention.

use crate::state::AppState;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use switchboard_core::types::{InterfaceTag, UserContext};
use uuid::Uuid;

type ApiError = (StatusCode, String);

// ── Health ──────────────────────────────────────────────────────────────

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(liveness))
}

async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

// ── processMessage ──────────────────────────────────────────────────────

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/v1/messages", post(process_message))
}

#[derive(Debug, Deserialize)]
struct ProcessMessageRequest {
    chat_id: String,
    message: String,
    #[serde(default)]
    interface_tag: InterfaceTag,
    #[serde(default)]
    user_context: Option<UserContext>,
}

async fn process_message(
    State(state): State<AppState>,
    Json(req): Json<ProcessMessageRequest>,
) -> impl IntoResponse {
    let result = state
        .orchestrator
        .process_message(&req.chat_id, &req.message, req.interface_tag, req.user_context)
        .await;
    Json(result)
}

// ── executeTool / getToolList ───────────────────────────────────────────

pub fn tool_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tools", get(list_tools))
        .route("/v1/tools/execute", post(execute_tool))
}

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.tool_registry().all())
}

#[derive(Debug, Deserialize)]
struct ExecuteToolRequest {
    tool_name: String,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteToolResponse {
    output: String,
}

async fn execute_tool(
    State(state): State<AppState>,
    Json(req): Json<ExecuteToolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let output = state
        .orchestrator
        .execute_tool(&req.tool_name, req.params, req.chat_id.as_deref(), req.user_id)
        .await
        .map_err(|kind| (status_for_error_kind(kind), format!("{kind:?}")))?;

    Ok(Json(ExecuteToolResponse { output }))
}

fn status_for_error_kind(kind: switchboard_core::types::ErrorKind) -> StatusCode {
    use switchboard_core::types::ErrorKind;
    match kind {
        ErrorKind::ToolNotFound => StatusCode::NOT_FOUND,
        ErrorKind::ToolValidation | ErrorKind::Validation | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ToolDenied | ErrorKind::Authz | ErrorKind::Auth => StatusCode::FORBIDDEN,
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Confirmation approve/deny ───────────────────────────────────────────

pub fn confirmation_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/confirmations/{id}/approve", post(approve_confirmation))
        .route("/v1/confirmations/{id}/deny", post(deny_confirmation))
}

#[derive(Debug, Deserialize)]
struct ConfirmationActorRequest {
    #[serde(default)]
    actor_id: String,
}

async fn approve_confirmation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmationActorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let middleware = state
        .orchestrator
        .confirmation_middleware()
        .ok_or((StatusCode::NOT_FOUND, "confirmation middleware not enabled".to_string()))?;

    let resolved = middleware.approve(id, &req.actor_id).await;
    if resolved {
        Ok(Json(serde_json::json!({"resolved": true})))
    } else {
        Err((StatusCode::NOT_FOUND, "no pending confirmation with that id".to_string()))
    }
}

async fn deny_confirmation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmationActorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let middleware = state
        .orchestrator
        .confirmation_middleware()
        .ok_or((StatusCode::NOT_FOUND, "confirmation middleware not enabled".to_string()))?;

    let resolved = middleware.deny(id, &req.actor_id).await;
    if resolved {
        Ok(Json(serde_json::json!({"resolved": true})))
    } else {
        Err((StatusCode::NOT_FOUND, "no pending confirmation with that id".to_string()))
    }
}

// ── getStats / healthCheck ──────────────────────────────────────────────

pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/stats", get(get_stats))
        .route("/v1/health", get(get_health))
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.get_stats())
}

async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.health_check().await)
}

// ── Events ───────────────────────────────────────────────────────────────

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/v1/events", get(events_ws))
}

async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_socket(socket, state))
}

async fn handle_events_socket(mut socket: axum::extract::ws::WebSocket, state: AppState) {
    use axum::extract::ws::Message as WsMessage;

    let mut events = state.orchestrator.event_bus().subscribe();

    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        let Ok(payload) = serde_json::to_string(&event) else { continue };
                        if socket.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("events websocket closed");
}
