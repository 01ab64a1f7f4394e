//! Owns the in-memory `session_id -> Session` table (component C9).
//!
//! This is the "in-memory singleton" the spec's redesign notes (section 9)
//! call out: rather than a free-floating global map, the table is owned by
//! one type with explicit lock discipline, and observers only ever see
//! read-only snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::Session;

/// Read-only snapshot of a session's liveness clocks, handed to callers that
/// need to reason about heartbeat/progress timeouts without holding the
/// table's lock.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub job_id: String,
    pub processed_chunks: usize,
    pub total_chunks: usize,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub last_progress_update: Option<chrono::DateTime<chrono::Utc>>,
    pub failed: bool,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            job_id: session.job_id.clone(),
            processed_chunks: session.processed_chunks,
            total_chunks: session.total_chunks,
            last_activity: session.last_activity,
            last_progress_update: session.last_progress_update,
            failed: session.failed,
        }
    }
}

/// Owned table of live sessions, keyed by `session_id`.
#[derive(Clone)]
pub struct SessionTracker {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a new session, created when the owning job leaves `queued`.
    pub async fn start(&self, session_id: impl Into<String>, job_id: impl Into<String>) {
        let session_id = session_id.into();
        let session = Session::new(session_id.clone(), job_id);
        self.sessions.write().await.insert(session_id, session);
    }

    /// Whether a session with this id is currently tracked.
    pub async fn validate(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Bumps `last_activity` without recording a progress event.
    pub async fn update_activity(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.touch();
        }
    }

    /// Records a progress event (refreshes both activity and progress
    /// clocks) and updates the processed/total chunk counters.
    pub async fn record_progress(
        &self,
        session_id: &str,
        event_kind: &str,
        payload: serde_json::Value,
        processed_chunks: Option<usize>,
        total_chunks: Option<usize>,
    ) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.record_progress(event_kind, payload);
            if let Some(processed) = processed_chunks {
                session.processed_chunks = processed;
            }
            if let Some(total) = total_chunks {
                session.total_chunks = total;
            }
        }
    }

    pub async fn mark_failed(&self, session_id: &str, _reason: impl Into<String>) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.mark_failed();
        }
    }

    /// Removes a session from the table, called when the owning job reaches
    /// a terminal state.
    pub async fn stop(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// A read-only snapshot, used by the cleanup sweep to evaluate liveness
    /// without holding the table lock for the duration of the sweep.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(session_id).map(SessionSnapshot::from)
    }

    #[must_use]
    pub async fn snapshot_all(&self) -> Vec<SessionSnapshot> {
        self.sessions.read().await.values().map(SessionSnapshot::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_evicted_on_stop() {
        let tracker = SessionTracker::new();
        tracker.start("s1", "j1").await;
        assert!(tracker.validate("s1").await);
        tracker.stop("s1").await;
        assert!(!tracker.validate("s1").await);
    }

    #[tokio::test]
    async fn record_progress_updates_counters_and_clock() {
        let tracker = SessionTracker::new();
        tracker.start("s1", "j1").await;
        tracker
            .record_progress("s1", "embedding_created", serde_json::json!({}), Some(3), Some(10))
            .await;
        let snapshot = tracker.snapshot("s1").await.expect("session");
        assert_eq!(snapshot.processed_chunks, 3);
        assert_eq!(snapshot.total_chunks, 10);
        assert!(snapshot.last_progress_update.is_some());
    }

    #[tokio::test]
    async fn unknown_session_operations_are_no_ops() {
        let tracker = SessionTracker::new();
        tracker.update_activity("missing").await;
        tracker.mark_failed("missing", "reason").await;
        assert!(tracker.snapshot("missing").await.is_none());
    }
}
