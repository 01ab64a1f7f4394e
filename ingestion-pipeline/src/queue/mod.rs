//! Durable priority queue of ingestion jobs with retries, timeouts,
//! heartbeats, and crash recovery (component C7). This is the largest single
//! component; it owns the active-jobs bookkeeping and the session table, per
//! the "in-memory singletons" redesign note (specification section 9): both
//! are owned tables behind explicit lock discipline, not free-floating
//! globals.

mod store;

pub use store::{InMemoryJobStore, JobStore};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use common::EngineConfig;

use crate::cancellation::CancellationFlag;
use crate::model::{Job, JobErrorInfo, JobInput, JobOptions, JobResult, JobStatus};
use crate::progress::{EventKind, ProgressBus, ProgressEvent};
use crate::session_tracker::SessionTracker;
use crate::IngestError;

/// Bookkeeping kept only for the lifetime of an in-flight job; never
/// persisted. `last_heartbeat` is refreshed by the periodic heartbeat timer
/// and by every progress event (specification section 4.7).
struct ActiveJob {
    session_id: String,
    started_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    cancellation: CancellationFlag,
}

/// A job claimed for execution, handed to the caller so it can drive the
/// `DocumentPipeline` and later report back via [`JobQueue::complete`] or
/// [`JobQueue::fail`].
pub struct ClaimedJob {
    pub job: Job,
    pub cancellation: CancellationFlag,
}

/// Durable scheduling, bounded concurrency, retries, timeout/heartbeat/
/// progress enforcement, cancellation, and recovery after restart.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    progress: ProgressBus,
    sessions: SessionTracker,
    config: EngineConfig,
    worker_id: String,
    active: Arc<tokio::sync::RwLock<HashMap<String, ActiveJob>>>,
}

impl JobQueue {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, progress: ProgressBus, sessions: SessionTracker, config: EngineConfig) -> Self {
        Self {
            store,
            progress,
            sessions,
            config,
            worker_id: common::ids::new_id(),
            active: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Ids of jobs this process currently holds a lease for, for a periodic
    /// heartbeat timer that refreshes clocks independent of progress events.
    #[must_use]
    pub async fn active_job_ids(&self) -> Vec<String> {
        self.active.read().await.keys().cloned().collect()
    }

    /// Submits a new job. Writes precede any in-memory bookkeeping
    /// (specification section 3: "Jobs are durable: writes precede in-memory
    /// enqueue").
    pub async fn submit(&self, input: JobInput, options: JobOptions, session_id: impl Into<String>) -> Result<Job, IngestError> {
        let job = Job::new(input, options, session_id);
        self.store.insert(job.clone()).await?;
        self.progress.publish(ProgressEvent::new(
            &job.job_id,
            &job.session_id,
            EventKind::JobQueued,
            serde_json::json!({"priority": job.priority}),
        ));
        Ok(job)
    }

    /// Claims the highest-priority ready job (lower `priority` first, ties
    /// broken by `created_at`), if the active set has room and a ready job
    /// exists. A job with a future `next_retry_at` is not yet ready.
    pub async fn claim_next_ready(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>, IngestError> {
        {
            let active = self.active.read().await;
            let limit = usize::try_from(self.config.max_concurrent_jobs).unwrap_or(usize::MAX);
            if active.len() >= limit {
                return Ok(None);
            }
        }

        let mut candidates = self.store.list_by_status(JobStatus::Queued).await?;
        candidates.retain(|job| job.next_retry_at.map_or(true, |at| at <= now));
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));

        let Some(mut job) = candidates.into_iter().next() else {
            return Ok(None);
        };

        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.worker_id = Some(self.worker_id.clone());
        job.lease_expires_at = Some(now + to_chrono(self.config.job_timeout()));
        job.updated_at = now;
        self.store.update(job.clone()).await?;

        let cancellation = CancellationFlag::new();
        self.active.write().await.insert(
            job.job_id.clone(),
            ActiveJob {
                session_id: job.session_id.clone(),
                started_at: now,
                last_heartbeat: now,
                cancellation: cancellation.clone(),
            },
        );
        self.sessions.start(&job.session_id, &job.job_id).await;

        self.progress.publish(ProgressEvent::new(
            &job.job_id,
            &job.session_id,
            EventKind::JobStarted,
            serde_json::json!({}),
        ));

        info!(job_id = %job.job_id, session_id = %job.session_id, priority = job.priority, "job claimed");
        Ok(Some(ClaimedJob { job, cancellation }))
    }

    /// Claims ready jobs until the active set reaches `max_concurrent_jobs`,
    /// the dispatcher's per-tick behavior (specification section 4.7).
    pub async fn dispatch_ready(&self, now: DateTime<Utc>) -> Result<Vec<ClaimedJob>, IngestError> {
        let mut claimed = Vec::new();
        while let Some(job) = self.claim_next_ready(now).await? {
            claimed.push(job);
        }
        Ok(claimed)
    }

    /// Refreshes the liveness clock for an active job. Called by the
    /// periodic heartbeat timer and implicitly by every progress event via
    /// [`JobQueue::observe_progress`].
    pub async fn heartbeat(&self, job_id: &str) {
        if let Some(active) = self.active.write().await.get_mut(job_id) {
            active.last_heartbeat = Utc::now();
        }
    }

    /// Refreshes both the job's heartbeat clock and the owning session's
    /// progress clock. The queue subscribes to the progress bus and calls
    /// this for every event it observes (breaking the callback coupling
    /// noted in specification section 9).
    pub async fn observe_progress(&self, event: &ProgressEvent) {
        self.heartbeat(&event.job_id).await;
        self.sessions
            .record_progress(&event.session_id, event_kind_label(event.event_kind), event.payload.clone(), None, None)
            .await;
    }

    /// Marks a job successfully completed and evicts its active/session
    /// bookkeeping.
    pub async fn complete(&self, job_id: &str, result: JobResult) -> Result<(), IngestError> {
        let mut job = self.store.get(job_id).await?.ok_or_else(|| IngestError::NotFound(job_id.to_string()))?;
        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.duration_ms = Some(result.processing_ms);
        job.result = Some(result);
        job.updated_at = now;
        self.store.update(job.clone()).await?;
        self.active.write().await.remove(job_id);
        self.sessions.stop(&job.session_id).await;
        self.progress.publish(ProgressEvent::new(job_id, &job.session_id, EventKind::JobCompleted, serde_json::json!({})));
        info!(job_id, "job completed");
        Ok(())
    }

    /// Marks a job as resolved `cancelled`, distinct from [`JobQueue::complete`]
    /// since cancellation is never retried and carries its own event kind.
    pub async fn finish_cancelled(&self, job_id: &str, result: JobResult) -> Result<(), IngestError> {
        let mut job = self.store.get(job_id).await?.ok_or_else(|| IngestError::NotFound(job_id.to_string()))?;
        let now = Utc::now();
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        job.duration_ms = Some(result.processing_ms);
        job.result = Some(result);
        job.updated_at = now;
        self.store.update(job.clone()).await?;
        self.active.write().await.remove(job_id);
        self.sessions.stop(&job.session_id).await;
        self.progress.publish(ProgressEvent::new(job_id, &job.session_id, EventKind::JobCancelled, serde_json::json!({})));
        info!(job_id, "job cancelled");
        Ok(())
    }

    /// Reports a job execution failure. Retries if `retries < max_retries`
    /// and the error is retryable and not a cancellation; otherwise the job
    /// becomes terminal `failed` and is marked dead-lettered.
    pub async fn fail(&self, job_id: &str, error: &IngestError) -> Result<(), IngestError> {
        let mut job = self.store.get(job_id).await?.ok_or_else(|| IngestError::NotFound(job_id.to_string()))?;
        let now = Utc::now();
        self.active.write().await.remove(job_id);

        if error.is_cancellation() {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now);
            job.updated_at = now;
            job.error = Some(JobErrorInfo { kind: "Cancelled".to_string(), message: error.to_string() });
            self.store.update(job.clone()).await?;
            self.sessions.stop(&job.session_id).await;
            self.progress.publish(ProgressEvent::new(job_id, &job.session_id, EventKind::JobCancelled, serde_json::json!({})));
            return Ok(());
        }

        let retryable = error.is_retryable() && job.retries < self.config.max_retries;
        if retryable {
            job.retries += 1;
            job.status = JobStatus::Queued;
            job.started_at = None;
            job.worker_id = None;
            job.lease_expires_at = None;
            let delay = self.config.retry_delay() * job.retries;
            job.next_retry_at = Some(now + to_chrono(delay));
            job.updated_at = now;
            job.error = Some(JobErrorInfo { kind: error_kind_label(error).to_string(), message: error.to_string() });
            self.store.update(job.clone()).await?;
            warn!(job_id, retries = job.retries, "job failed, scheduling retry");
        } else {
            job.status = JobStatus::Failed;
            job.failed_at = Some(now);
            job.updated_at = now;
            job.dead_letter = true;
            job.error = Some(JobErrorInfo { kind: error_kind_label(error).to_string(), message: error.to_string() });
            self.store.update(job.clone()).await?;
            self.sessions.stop(&job.session_id).await;
            self.progress.publish(ProgressEvent::new(job_id, &job.session_id, EventKind::JobFailed, serde_json::json!({})));
            warn!(job_id, retries = job.retries, "job failed terminally, dead-lettered");
        }

        Ok(())
    }

    /// Cancels a single job: removes it from the queue if still `queued`, or
    /// flips the active job's cancellation flag so the running pipeline
    /// observes it at its next suspension point.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), IngestError> {
        if let Some(active) = self.active.read().await.get(job_id) {
            active.cancellation.cancel();
            return Ok(());
        }

        let Some(mut job) = self.store.get(job_id).await? else {
            return Err(IngestError::NotFound(job_id.to_string()));
        };
        if job.status == JobStatus::Queued {
            let now = Utc::now();
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now);
            job.updated_at = now;
            self.store.update(job.clone()).await?;
            self.sessions.stop(&job.session_id).await;
            self.progress.publish(ProgressEvent::new(job_id, &job.session_id, EventKind::JobCancelled, serde_json::json!({})));
        }
        Ok(())
    }

    /// Cancels every job belonging to `session_id`, atomically with respect
    /// to the caller's view: each matching job is either removed from the
    /// queue or flagged for cooperative cancellation.
    pub async fn cancel_session(&self, session_id: &str) -> Result<(), IngestError> {
        let jobs = self.store.list_by_session(session_id).await?;
        for job in jobs {
            if !job.status.is_terminal() {
                self.cancel_job(&job.job_id).await?;
            }
        }
        Ok(())
    }

    /// Fails any active job that has exceeded its absolute deadline, its
    /// heartbeat timeout, or its progress timeout. Returns the ids of jobs
    /// that were failed this sweep.
    pub async fn run_cleanup_sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>, IngestError> {
        let snapshot: Vec<(String, String, DateTime<Utc>, DateTime<Utc>)> = self
            .active
            .read()
            .await
            .iter()
            .map(|(id, active)| (id.clone(), active.session_id.clone(), active.started_at, active.last_heartbeat))
            .collect();

        let job_timeout = to_chrono(self.config.job_timeout());
        let heartbeat_timeout = to_chrono(self.config.heartbeat_timeout());
        let progress_timeout = to_chrono(self.config.progress_timeout());

        let mut timed_out = Vec::new();
        for (job_id, session_id, started_at, last_heartbeat) in snapshot {
            let deadline_exceeded = now - started_at > job_timeout;
            let heartbeat_exceeded = now - last_heartbeat > heartbeat_timeout;
            let progress_exceeded = match self.sessions.snapshot(&session_id).await {
                Some(session) => {
                    let last_progress = session.last_progress_update.unwrap_or(started_at);
                    now - last_progress > progress_timeout
                }
                None => false,
            };

            if deadline_exceeded || heartbeat_exceeded || progress_exceeded {
                self.fail(&job_id, &IngestError::Timeout(job_id.clone())).await?;
                timed_out.push(job_id);
            }
        }
        Ok(timed_out)
    }

    /// Rewinds every durable job left in `processing` back to `queued`,
    /// preserving its retry count. Run once at startup before the dispatcher
    /// begins claiming jobs (specification section 4.7's recovery
    /// requirement; see `DESIGN.md` for why retries are preserved rather
    /// than reset).
    pub async fn recover(&self) -> Result<usize, IngestError> {
        let orphaned = self.store.list_by_status(JobStatus::Processing).await?;
        let now = Utc::now();
        let mut recovered = 0usize;
        for mut job in orphaned {
            job.status = JobStatus::Queued;
            job.started_at = None;
            job.worker_id = None;
            job.lease_expires_at = None;
            job.updated_at = now;
            self.store.update(job).await?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "rewound orphaned processing jobs to queued");
        }
        Ok(recovered)
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(5_200))
}

fn event_kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::ProcessingStarted => "processing_started",
        EventKind::ChunkingComplete => "chunking_complete",
        EventKind::AnalysisCompleted => "analysis_completed",
        EventKind::EmbeddingCreated => "embedding_created",
        EventKind::VectorStored => "vector_stored",
        EventKind::VectorError => "vector_error",
        EventKind::ProgressUpdate => "progress_update",
        EventKind::Heartbeat => "heartbeat",
        EventKind::ProcessingCompleted => "processing_completed",
        EventKind::ErrorOccurred => "error_occurred",
        EventKind::JobQueued => "job_queued",
        EventKind::JobStarted => "job_started",
        EventKind::JobCompleted => "job_completed",
        EventKind::JobFailed => "job_failed",
        EventKind::JobCancelled => "job_cancelled",
    }
}

fn error_kind_label(error: &IngestError) -> &'static str {
    match error {
        IngestError::InvalidInput(_) => "InvalidInput",
        IngestError::SourceAcquisitionError(_) => "SourceAcquisitionError",
        IngestError::TransientExternalError(_) => "TransientExternalError",
        IngestError::PermanentExternalError(_) => "PermanentExternalError",
        IngestError::PersistenceConflict(_) => "PersistenceConflict",
        IngestError::Timeout(_) => "Timeout",
        IngestError::Cancelled(_) => "Cancelled",
        IngestError::NotFound(_) => "NotFound",
        IngestError::Join(_) => "Join",
        IngestError::Internal(_) => "Internal",
    }
}

#[cfg(test)]
mod tests;
