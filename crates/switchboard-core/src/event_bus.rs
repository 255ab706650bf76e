//! Event Bus (spec.md §4.H) — in-process publish/subscribe over the
//! orchestrator's closed event-type set, built on `tokio::sync::broadcast`
//! exactly as the teacher's original event bus, plus a last-N ring buffer
//! for diagnostics (new relative to the teacher, which has no replay
//! buffer — grounded directly in spec.md §4.H).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;
const DEFAULT_RING_BUFFER_CAPACITY: usize = 1000;

/// The closed set of event types the orchestrator emits (spec.md §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ProcessingStarted,
    ContextLoaded,
    RoutingDecision,
    ModelGenerating,
    ToolConfirmationRequested,
    ToolConfirmed,
    ToolDenied,
    ToolExpired,
    ProcessingCompleted,
    ProcessingFailed,
}

/// A single event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub chat_id: String,
    pub trace_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: EventType, chat_id: impl Into<String>, trace_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            chat_id: chat_id.into(),
            trace_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Central publish/subscribe bus plus a bounded replay ring buffer.
///
/// Delivery is at-most-once per subscriber and non-blocking to the
/// publisher: `tokio::sync::broadcast` drops the oldest unread message for
/// a lagging subscriber rather than backpressuring the publisher, matching
/// spec.md §4.H's "bounded per-subscriber queue, drop-oldest on overflow".
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    ring_buffer: Arc<Mutex<VecDeque<Event>>>,
    ring_buffer_capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_RING_BUFFER_CAPACITY)
    }

    pub fn with_capacity(channel_capacity: usize, ring_buffer_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            sender,
            ring_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(ring_buffer_capacity))),
            ring_buffer_capacity,
        }
    }

    /// Publish an event to all current subscribers. Subscriber-side panics
    /// or logging are the caller's responsibility while draining a
    /// `Receiver`/`FilteredSubscriber` — they never unwind into `publish`
    /// (spec.md §4.H: "Handler exceptions MUST NOT propagate to the
    /// publisher").
    pub fn publish(&self, event: Event) {
        {
            let mut ring = self.ring_buffer.lock().expect("event bus ring buffer lock poisoned");
            ring.push_back(event.clone());
            while ring.len() > self.ring_buffer_capacity {
                ring.pop_front();
            }
        }
        // broadcast::send only errors when there are zero receivers, which
        // is a normal steady state here, not a failure worth surfacing.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, types: Vec<EventType>) -> FilteredSubscriber {
        FilteredSubscriber {
            receiver: self.sender.subscribe(),
            filter: types.into_iter().collect(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The most recent events in the ring buffer, oldest first.
    pub fn recent_events(&self) -> Vec<Event> {
        self.ring_buffer
            .lock()
            .expect("event bus ring buffer lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber that only yields events matching a set of [`EventType`]s.
pub struct FilteredSubscriber {
    receiver: broadcast::Receiver<Event>,
    filter: HashSet<EventType>,
}

impl FilteredSubscriber {
    /// Receive the next event that matches the filter. Non-matching events
    /// and lag gaps reported by the underlying channel are silently
    /// skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.contains(&event.event_type) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn publish_receive_roundtrip() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let event = Event::new(EventType::ProcessingStarted, "chat-1", trace(), serde_json::json!({}));
        let event_id = event.id;
        bus.publish(event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::ProcessingStarted);
        assert_eq!(received.id, event_id);
    }

    #[tokio::test]
    async fn filtered_subscriber_skips_non_matching() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(vec![EventType::ProcessingFailed]);

        bus.publish(Event::new(EventType::ProcessingStarted, "chat-1", trace(), serde_json::json!({})));
        let failed = Event::new(EventType::ProcessingFailed, "chat-1", trace(), serde_json::json!({"reason": "timeout"}));
        let failed_id = failed.id;
        bus.publish(failed);

        let received = filtered.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::ProcessingFailed);
        assert_eq!(received.id, failed_id);
    }

    #[test]
    fn subscriber_count_tracks_live_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx2);
    }

    #[test]
    fn ring_buffer_retains_only_last_n_events() {
        let bus = EventBus::with_capacity(16, 3);
        for i in 0..5 {
            bus.publish(Event::new(EventType::ModelGenerating, "chat-1", trace(), serde_json::json!({"i": i})));
        }
        let recent = bus.recent_events();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].payload["i"], 2);
        assert_eq!(recent[2].payload["i"], 4);
    }

    #[test]
    fn publish_with_zero_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish(Event::new(EventType::ProcessingCompleted, "chat-1", trace(), serde_json::json!({})));
        assert_eq!(bus.recent_events().len(), 1);
    }

    #[tokio::test]
    async fn events_are_ordered_per_chat() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventType::ProcessingStarted, "chat-1", trace(), serde_json::json!({"seq": 1})));
        bus.publish(Event::new(EventType::ProcessingCompleted, "chat-1", trace(), serde_json::json!({"seq": 2})));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.payload["seq"], 1);
        assert_eq!(second.payload["seq"], 2);
    }
}
