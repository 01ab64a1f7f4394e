use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single progress snapshot recorded for a session, retained so a late
/// subscriber can be shown recent history instead of only the live stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub event_kind: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Tracks one client's view onto an in-flight job, per specification
/// section 4.9. A session is scoped to a single job; fan-out across many
/// jobs is the caller's responsibility, not this type's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub job_id: String,
    pub processed_chunks: usize,
    pub total_chunks: usize,
    pub last_activity: DateTime<Utc>,
    pub last_progress_update: Option<DateTime<Utc>>,
    pub progress_updates: Vec<ProgressUpdate>,
    pub failed: bool,
}

impl Session {
    #[must_use]
    pub fn new(session_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            job_id: job_id.into(),
            processed_chunks: 0,
            total_chunks: 0,
            last_activity: now,
            last_progress_update: None,
            progress_updates: Vec::new(),
            failed: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Records a progress event, bumping both activity and progress
    /// timestamps; every event counts as activity (section 4.9).
    pub fn record_progress(&mut self, event_kind: impl Into<String>, payload: serde_json::Value) {
        let now = Utc::now();
        self.last_activity = now;
        self.last_progress_update = Some(now);
        self.progress_updates.push(ProgressUpdate {
            event_kind: event_kind.into(),
            payload,
            recorded_at: now,
        });
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_progress_updates_both_timestamps() {
        let mut session = Session::new("s1", "j1");
        assert!(session.last_progress_update.is_none());
        session.record_progress("chunk_processed", serde_json::json!({"chunk_index": 0}));
        assert!(session.last_progress_update.is_some());
        assert_eq!(session.progress_updates.len(), 1);
    }

    #[test]
    fn mark_failed_sets_flag_and_touches() {
        let mut session = Session::new("s1", "j1");
        let before = session.last_activity;
        std::thread::sleep(std::time::Duration::from_millis(2));
        session.mark_failed();
        assert!(session.failed);
        assert!(session.last_activity >= before);
    }
}
