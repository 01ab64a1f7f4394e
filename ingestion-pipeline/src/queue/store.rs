//! The durable side of the job queue: a storage-agnostic trait plus an
//! in-memory reference implementation used by tests and by any caller that
//! doesn't need cross-process durability. A `surrealdb`-backed implementation
//! would live behind the same trait (kept as an interface boundary per
//! specification section 2's "Store adapters (interface only)").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Job, JobStatus};
use crate::IngestError;

/// Durable storage for `Job` records. Implementations are expected to persist
/// writes before `insert`/`update` return, matching the "writes precede
/// in-memory enqueue" durability invariant (specification section 3).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), IngestError>;

    async fn update(&self, job: Job) -> Result<(), IngestError>;

    async fn get(&self, job_id: &str) -> Result<Option<Job>, IngestError>;

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, IngestError>;

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Job>, IngestError>;

    async fn list_all(&self) -> Result<Vec<Job>, IngestError>;
}

/// A process-local `JobStore`, keyed by `job_id`. Good enough for tests and
/// for single-process deployments; offers no durability across restarts.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), IngestError> {
        self.jobs.write().await.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn update(&self, job: Job) -> Result<(), IngestError> {
        let mut guard = self.jobs.write().await;
        if !guard.contains_key(&job.job_id) {
            return Err(IngestError::NotFound(job.job_id));
        }
        guard.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, IngestError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, IngestError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Job>, IngestError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Job>, IngestError> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobInput, JobOptions};

    fn sample_job() -> Job {
        Job::new(JobInput::Url { url: "https://example.org/a".into() }, JobOptions::default(), "s1")
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let id = job.job_id.clone();
        store.insert(job).await.expect("insert");
        let fetched = store.get(&id).await.expect("get").expect("present");
        assert_eq!(fetched.job_id, id);
    }

    #[tokio::test]
    async fn update_of_unknown_job_fails() {
        let store = InMemoryJobStore::new();
        let err = store.update(sample_job()).await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = InMemoryJobStore::new();
        let mut job = sample_job();
        store.insert(job.clone()).await.expect("insert");
        job.status = JobStatus::Processing;
        store.update(job).await.expect("update");
        let queued = store.list_by_status(JobStatus::Queued).await.expect("list");
        let processing = store.list_by_status(JobStatus::Processing).await.expect("list");
        assert!(queued.is_empty());
        assert_eq!(processing.len(), 1);
    }
}
