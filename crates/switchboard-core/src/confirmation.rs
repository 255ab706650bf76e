//! Confirmation Middleware (spec.md §4.K) — gates execution of tools that
//! declare `requiresConfirmation=true` behind an out-of-band human
//! approve/deny round trip.
//!
//! The single-shot completion signal named in spec.md §3 is a
//! `tokio::sync::oneshot::Sender<ConfirmationOutcome>` stored alongside the
//! pending entry — the idiomatic Tokio primitive for exactly-once
//! completion, replacing the spec's language-agnostic phrasing. The
//! sweeper loop follows the same `tokio::spawn` + `tokio::time::interval`
//! shape as `agent-server::routes::handle_terminal_socket`'s reader task.

use crate::error::AgentError;
use crate::event_bus::{Event, EventBus, EventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// A request awaiting human approval, as published to `confirmationSender`
/// and to the `TOOL_CONFIRMATION_REQUESTED` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub confirmation_id: Uuid,
    pub tool_name: String,
    pub parameters: Value,
    pub chat_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub timeout_ms: u64,
    pub status: ConfirmationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Approved,
    Denied,
}

struct PendingEntry {
    request: ConfirmationRequest,
    completion: Option<oneshot::Sender<Outcome>>,
}

/// Adapter-supplied callback that delivers a `ConfirmationRequest` to a
/// human (spec.md §6's `confirmationSender` contract). The adapter is
/// responsible for eventually calling `approve`/`deny` on this middleware.
#[async_trait::async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send(&self, request: &ConfirmationRequest);
}

/// A sender that never delivers anything; used when no interface adapter
/// is wired up. Every confirmation times out and is therefore denied.
pub struct NullConfirmationSender;

#[async_trait::async_trait]
impl ConfirmationSender for NullConfirmationSender {
    async fn send(&self, _request: &ConfirmationRequest) {}
}

pub struct ConfirmationMiddleware {
    pending: Arc<Mutex<HashMap<Uuid, PendingEntry>>>,
    sender: Arc<dyn ConfirmationSender>,
    event_bus: EventBus,
    default_timeout_ms: u64,
}

impl ConfirmationMiddleware {
    pub fn new(sender: Arc<dyn ConfirmationSender>, event_bus: EventBus) -> Self {
        Self { pending: Arc::new(Mutex::new(HashMap::new())), sender, event_bus, default_timeout_ms: DEFAULT_TIMEOUT_MS }
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Spawn the background sweeper that expires stale PENDING entries
    /// every `SWEEP_INTERVAL`. The returned handle may be dropped to detach
    /// the task, or aborted to stop sweeping.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let pending = self.pending.clone();
        let event_bus = self.event_bus.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                sweep_expired(&pending, &event_bus).await;
            }
        })
    }

    /// Request human confirmation for a tool invocation. Resolves once the
    /// request is approved, denied, or expires.
    pub async fn request_confirmation(
        &self,
        tool_name: &str,
        parameters: Value,
        chat_id: &str,
        user_id: Option<String>,
        trace_id: Uuid,
        timeout_ms: Option<u64>,
    ) -> bool {
        let confirmation_id = Uuid::new_v4();
        let timeout_ms = timeout_ms.unwrap_or(self.default_timeout_ms);

        let request = ConfirmationRequest {
            confirmation_id,
            tool_name: tool_name.to_string(),
            parameters,
            chat_id: chat_id.to_string(),
            user_id,
            created_at: Utc::now(),
            timeout_ms,
            status: ConfirmationStatus::Pending,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(confirmation_id, PendingEntry { request: request.clone(), completion: Some(tx) });
        }

        self.sender.send(&request).await;
        self.event_bus.publish(Event::new(
            EventType::ToolConfirmationRequested,
            chat_id,
            trace_id,
            serde_json::json!({"confirmationId": confirmation_id, "toolName": tool_name}),
        ));

        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await;

        match outcome {
            Ok(Ok(Outcome::Approved)) => {
                self.event_bus.publish(Event::new(
                    EventType::ToolConfirmed,
                    chat_id,
                    trace_id,
                    serde_json::json!({"confirmationId": confirmation_id}),
                ));
                true
            }
            Ok(Ok(Outcome::Denied)) => {
                self.event_bus.publish(Event::new(
                    EventType::ToolDenied,
                    chat_id,
                    trace_id,
                    serde_json::json!({"confirmationId": confirmation_id}),
                ));
                false
            }
            Ok(Err(_)) | Err(_) => {
                // Sender dropped (treated as denial) or deadline elapsed.
                self.pending.lock().await.remove(&confirmation_id);
                self.event_bus.publish(Event::new(
                    EventType::ToolExpired,
                    chat_id,
                    trace_id,
                    serde_json::json!({"confirmationId": confirmation_id}),
                ));
                false
            }
        }
    }

    pub async fn approve(&self, confirmation_id: Uuid, _approver_id: &str) -> bool {
        self.resolve(confirmation_id, Outcome::Approved).await
    }

    pub async fn deny(&self, confirmation_id: Uuid, _denier_id: &str) -> bool {
        self.resolve(confirmation_id, Outcome::Denied).await
    }

    async fn resolve(&self, confirmation_id: Uuid, outcome: Outcome) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.get_mut(&confirmation_id) else { return false };
        let Some(completion) = entry.completion.take() else { return false };
        pending.remove(&confirmation_id);
        completion.send(outcome).is_ok()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn get(&self, confirmation_id: Uuid) -> Option<ConfirmationRequest> {
        self.pending.lock().await.get(&confirmation_id).map(|e| e.request.clone())
    }
}

async fn sweep_expired(pending: &Arc<Mutex<HashMap<Uuid, PendingEntry>>>, event_bus: &EventBus) {
    let now = Utc::now();
    let mut expired = Vec::new();

    {
        let mut guard = pending.lock().await;
        let ids: Vec<Uuid> = guard
            .iter()
            .filter(|(_, entry)| {
                let age_ms = (now - entry.request.created_at).num_milliseconds().max(0) as u64;
                age_ms > entry.request.timeout_ms
            })
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Some(mut entry) = guard.remove(&id) {
                if let Some(completion) = entry.completion.take() {
                    let _ = completion.send(Outcome::Denied);
                }
                expired.push((id, entry.request.chat_id));
            }
        }
    }

    for (id, chat_id) in expired {
        event_bus.publish(Event::new(
            EventType::ToolExpired,
            chat_id,
            Uuid::new_v4(),
            serde_json::json!({"confirmationId": id}),
        ));
    }
}

/// Classify a denied-by-expiry-or-refusal confirmation into the public
/// error taxonomy: both are surfaced to callers as TOOL_DENIED, per
/// spec.md §8 scenario S5 ("treated as denied for safety").
pub fn denial_error(tool_name: &str) -> AgentError {
    AgentError::ToolDenied(tool_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSender {
        seen: Mutex<Vec<Uuid>>,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self { seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl ConfirmationSender for RecordingSender {
        async fn send(&self, request: &ConfirmationRequest) {
            self.seen.lock().await.push(request.confirmation_id);
        }
    }

    #[tokio::test]
    async fn approve_resolves_request_confirmation_true() {
        let sender = Arc::new(RecordingSender::new());
        let bus = EventBus::new();
        let middleware = Arc::new(ConfirmationMiddleware::new(sender, bus));

        let mw = middleware.clone();
        let handle = tokio::spawn(async move {
            mw.request_confirmation("delete_files", serde_json::json!({}), "chat-1", None, Uuid::new_v4(), Some(5_000)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending_id = {
            let pending = middleware.pending.lock().await;
            *pending.keys().next().unwrap()
        };
        assert!(middleware.approve(pending_id, "admin").await);

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn deny_resolves_request_confirmation_false() {
        let sender = Arc::new(RecordingSender::new());
        let bus = EventBus::new();
        let middleware = Arc::new(ConfirmationMiddleware::new(sender, bus));

        let mw = middleware.clone();
        let handle = tokio::spawn(async move {
            mw.request_confirmation("delete_files", serde_json::json!({}), "chat-1", None, Uuid::new_v4(), Some(5_000)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending_id = {
            let pending = middleware.pending.lock().await;
            *pending.keys().next().unwrap()
        };
        assert!(middleware.deny(pending_id, "admin").await);

        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn timeout_denies_and_removes_entry() {
        let sender = Arc::new(RecordingSender::new());
        let bus = EventBus::new();
        let middleware = ConfirmationMiddleware::new(sender, bus);

        let approved = middleware
            .request_confirmation("delete_files", serde_json::json!({}), "chat-1", None, Uuid::new_v4(), Some(30))
            .await;

        assert!(!approved);
        assert_eq!(middleware.pending_count().await, 0);
    }

    #[tokio::test]
    async fn second_approve_is_idempotent_false() {
        let sender = Arc::new(RecordingSender::new());
        let bus = EventBus::new();
        let middleware = Arc::new(ConfirmationMiddleware::new(sender, bus));

        let mw = middleware.clone();
        let handle = tokio::spawn(async move {
            mw.request_confirmation("delete_files", serde_json::json!({}), "chat-1", None, Uuid::new_v4(), Some(5_000)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending_id = {
            let pending = middleware.pending.lock().await;
            *pending.keys().next().unwrap()
        };
        assert!(middleware.approve(pending_id, "admin").await);
        assert!(!middleware.approve(pending_id, "admin").await);
        assert!(!middleware.deny(pending_id, "admin").await);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_confirmation_id_returns_false() {
        let sender = Arc::new(RecordingSender::new());
        let bus = EventBus::new();
        let middleware = ConfirmationMiddleware::new(sender, bus);
        assert!(!middleware.approve(Uuid::new_v4(), "admin").await);
    }

    #[tokio::test]
    async fn sweeper_expires_entries_past_their_deadline() {
        let sender = Arc::new(RecordingSender::new());
        let bus = EventBus::new();
        let middleware = Arc::new(ConfirmationMiddleware::new(sender, bus));

        let mw = middleware.clone();
        let handle = tokio::spawn(async move {
            mw.request_confirmation("delete_files", serde_json::json!({}), "chat-1", None, Uuid::new_v4(), Some(600_000)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let mut pending = middleware.pending.lock().await;
            for entry in pending.values_mut() {
                entry.request.created_at = Utc::now() - chrono::Duration::milliseconds(700_000);
            }
        }

        sweep_expired(&middleware.pending, &middleware.event_bus).await;
        assert!(!handle.await.unwrap());
    }
}
