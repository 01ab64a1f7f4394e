//! A typed, lossy, fan-out event stream surfaced to observers (component
//! C8). Delivery is best-effort: the pipeline never blocks on publication,
//! and a missing or lagging subscriber never affects correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The closed set of event kinds a subscriber may observe (specification
/// section 4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProcessingStarted,
    ChunkingComplete,
    AnalysisCompleted,
    EmbeddingCreated,
    VectorStored,
    VectorError,
    ProgressUpdate,
    Heartbeat,
    ProcessingCompleted,
    ErrorOccurred,
    JobQueued,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

/// One envelope published on the bus, matching the wire shape in
/// specification section 6 (`{event, job_id, session_id, timestamp, data}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub session_id: String,
    pub event_kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        session_id: impl Into<String>,
        event_kind: EventKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            session_id: session_id.into(),
            event_kind,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Capacity of the broadcast channel's internal ring buffer. Subscribers
/// that fall this far behind silently miss events rather than apply
/// backpressure to publishers (lossy by design, per section 4.8).
const CHANNEL_CAPACITY: usize = 1024;

/// A fan-out progress channel. Cloning shares the same underlying
/// broadcast sender, matching `tokio::sync::broadcast`'s own semantics.
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to the event stream. Each subscriber gets its own lagging
    /// window; a slow subscriber drops old events rather than blocking
    /// publication.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Never blocks; a publish with zero subscribers is
    /// a silent no-op, matching "missing subscribers do not affect
    /// correctness".
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = ProgressBus::new();
        bus.publish(ProgressEvent::new("j1", "s1", EventKind::JobQueued, serde_json::json!({})));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe();
        bus.publish(ProgressEvent::new(
            "j1",
            "s1",
            EventKind::ChunkingComplete,
            serde_json::json!({"count": 3}),
        ));
        let event = rx.recv().await.expect("event");
        assert_eq!(event.event_kind, EventKind::ChunkingComplete);
        assert_eq!(event.payload["count"], 3);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_the_event() {
        let bus = ProgressBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(ProgressEvent::new("j1", "s1", EventKind::JobStarted, serde_json::json!({})));
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }
}
