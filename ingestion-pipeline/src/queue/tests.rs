use super::*;
use crate::model::{JobInput, JobOptions};
use chrono::Duration;

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.max_concurrent_jobs = 2;
    config.max_retries = 2;
    config.retry_delay_ms = 1_000;
    config.heartbeat_timeout_ms = 5_000;
    config.progress_timeout_ms = 10_000;
    config.job_timeout_ms = 60_000;
    config
}

fn new_queue() -> JobQueue {
    JobQueue::new(InMemoryJobStore::shared(), ProgressBus::new(), SessionTracker::new(), test_config())
}

fn url_job_options(priority: i32) -> (JobInput, JobOptions) {
    let mut options = JobOptions::default();
    options.priority = priority;
    (JobInput::Url { url: "https://example.org/a".into() }, options)
}

#[tokio::test]
async fn claims_lower_priority_before_higher() {
    let queue = new_queue();
    let (input_low, options_low) = url_job_options(5);
    let (input_high, options_high) = url_job_options(1);
    queue.submit(input_low, options_low, "s1").await.expect("submit");
    let urgent = queue.submit(input_high, options_high, "s2").await.expect("submit");

    let now = Utc::now();
    let claimed = queue.claim_next_ready(now).await.expect("claim").expect("a job");
    assert_eq!(claimed.job.job_id, urgent.job_id);
}

#[tokio::test]
async fn respects_max_concurrent_jobs() {
    let queue = new_queue();
    for _ in 0..3 {
        let (input, options) = url_job_options(5);
        queue.submit(input, options, "s1").await.expect("submit");
    }
    let now = Utc::now();
    let first = queue.claim_next_ready(now).await.expect("claim");
    let second = queue.claim_next_ready(now).await.expect("claim");
    let third = queue.claim_next_ready(now).await.expect("claim");
    assert!(first.is_some());
    assert!(second.is_some());
    assert!(third.is_none(), "active set is already at max_concurrent_jobs");
}

#[tokio::test]
async fn retryable_failure_requeues_with_increasing_next_retry_at() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    let now = Utc::now();
    queue.claim_next_ready(now).await.expect("claim");

    queue.fail(&submitted.job_id, &IngestError::TransientExternalError("timeout".into())).await.expect("fail");
    let after_first = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(after_first.status, JobStatus::Queued);
    assert_eq!(after_first.retries, 1);
    let first_retry_at = after_first.next_retry_at.expect("next_retry_at set");

    let claimable_at = first_retry_at + Duration::seconds(1);
    queue.claim_next_ready(claimable_at).await.expect("claim retry");
    queue.fail(&submitted.job_id, &IngestError::TransientExternalError("timeout".into())).await.expect("fail again");
    let after_second = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(after_second.retries, 2);
    assert!(after_second.next_retry_at.expect("set") > first_retry_at);
}

#[tokio::test]
async fn exhausted_retries_becomes_terminal_dead_letter() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    let mut now = Utc::now();

    for _ in 0..=2 {
        queue.claim_next_ready(now).await.expect("claim");
        queue.fail(&submitted.job_id, &IngestError::TransientExternalError("timeout".into())).await.expect("fail");
        now += Duration::hours(1);
    }

    let job = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.dead_letter);
    assert_eq!(job.retries, queue.config.max_retries);
}

#[tokio::test]
async fn non_retryable_failure_is_terminal_immediately() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    queue.claim_next_ready(Utc::now()).await.expect("claim");

    queue.fail(&submitted.job_id, &IngestError::PermanentExternalError("bad request".into())).await.expect("fail");
    let job = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 0);
}

#[tokio::test]
async fn cancel_job_on_queued_job_is_immediately_terminal() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    queue.cancel_job(&submitted.job_id).await.expect("cancel");
    let job = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_job_on_active_job_flips_cancellation_flag() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    let claimed = queue.claim_next_ready(Utc::now()).await.expect("claim").expect("a job");
    assert!(!claimed.cancellation.is_cancelled());

    queue.cancel_job(&submitted.job_id).await.expect("cancel");
    assert!(claimed.cancellation.is_cancelled());

    let job = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(job.status, JobStatus::Processing, "store status is only finalized once the pipeline reports back");
}

#[tokio::test]
async fn cancel_session_cancels_every_non_terminal_job_for_that_session() {
    let queue = new_queue();
    let (input_a, options_a) = url_job_options(5);
    let (input_b, options_b) = url_job_options(5);
    let job_a = queue.submit(input_a, options_a, "shared-session").await.expect("submit");
    let job_b = queue.submit(input_b, options_b, "shared-session").await.expect("submit");

    queue.cancel_session("shared-session").await.expect("cancel session");

    let a = queue.store.get(&job_a.job_id).await.expect("get").expect("present");
    let b = queue.store.get(&job_b.job_id).await.expect("get").expect("present");
    assert_eq!(a.status, JobStatus::Cancelled);
    assert_eq!(b.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cleanup_sweep_fails_job_past_heartbeat_timeout() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    let start = Utc::now();
    queue.claim_next_ready(start).await.expect("claim");

    let past_heartbeat_timeout = start + Duration::seconds(6);
    let failed = queue.run_cleanup_sweep(past_heartbeat_timeout).await.expect("sweep");
    assert_eq!(failed, vec![submitted.job_id.clone()]);

    let job = queue.store.get(&submitted.job_id).await.expect("get").expect("present");
    assert_eq!(job.status, JobStatus::Failed, "a heartbeat timeout is immediately terminal, not retried");
    assert_eq!(job.error.as_ref().map(|e| e.kind.as_str()), Some("Timeout"));
}

#[tokio::test]
async fn heartbeat_and_progress_observation_prevents_premature_cleanup() {
    let queue = new_queue();
    let (input, options) = url_job_options(5);
    let submitted = queue.submit(input, options, "s1").await.expect("submit");
    let start = Utc::now();
    queue.claim_next_ready(start).await.expect("claim");

    queue
        .observe_progress(&ProgressEvent::new(&submitted.job_id, "s1", EventKind::ProgressUpdate, serde_json::json!({})))
        .await;

    let just_under_timeout = start + Duration::seconds(4);
    let failed = queue.run_cleanup_sweep(just_under_timeout).await.expect("sweep");
    assert!(failed.is_empty());
}

#[tokio::test]
async fn recover_rewinds_processing_jobs_to_queued_preserving_retries() {
    let store = InMemoryJobStore::shared();
    let (input, options) = url_job_options(5);
    let mut job = Job::new(input, options, "s1");
    job.status = JobStatus::Processing;
    job.retries = 1;
    job.worker_id = Some("dead-worker".to_string());
    store.insert(job.clone()).await.expect("insert");

    let queue = JobQueue::new(store.clone(), ProgressBus::new(), SessionTracker::new(), test_config());
    let recovered = queue.recover().await.expect("recover");
    assert_eq!(recovered, 1);

    let rewound = store.get(&job.job_id).await.expect("get").expect("present");
    assert_eq!(rewound.status, JobStatus::Queued);
    assert_eq!(rewound.retries, 1, "retries are preserved across recovery, not reset");
    assert!(rewound.worker_id.is_none());
}
