//! Standalone worker process driving the ingestion engine's job queue.
//!
//! This wires up component C7's three independent periodic tasks (dispatcher,
//! cleanup sweeper, heartbeat timer) plus a progress-bus subscriber that
//! feeds events back into the queue's liveness clocks, the way the teacher's
//! `worker.rs` wires a single `run_worker_loop` against a concrete store and
//! model provider. The concrete `AIClient`/`VectorStore`/`RelationalStore`/
//! `Parser`/`URLFetcher` backends are out of scope for this engine (section 1
//! of the specification: "the core consumes them through capability traits");
//! this binary stands them up with the crate's in-memory test doubles so the
//! whole pipeline is runnable end to end without an external database or
//! model provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser as ClapParser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::EngineConfig;
use ingestion_pipeline::external::parser::Parser as DocumentParser;
use ingestion_pipeline::external::relational_store::DocumentStatusUpdate;
use ingestion_pipeline::external::url_fetcher::{FetchOptions, URLFetcher};
use ingestion_pipeline::model::{Document, JobInput, JobOptions, JobResult, ProcessingStatus, RecordKind};
use ingestion_pipeline::testing::{new_fake_stack, FakePlainTextParser, FakeUrlFetcher};
use ingestion_pipeline::{
    build_descriptors, plan_split, ClaimedJob, ContextEngine, DocumentPipeline, EmbeddingBinder,
    IngestError, InMemoryJobStore, JobQueue, PersistenceCoordinator, ProgressBus, SessionTracker,
};

/// Seeds a single job at startup so the worker has something to process;
/// a real deployment submits jobs through whatever surface sits above this
/// engine (out of scope here, per section 1 of the specification).
#[derive(Debug, ClapParser)]
#[command(about = "Runs the ingestion engine's durable job queue against in-memory test backends")]
struct Args {
    /// A URL to seed as a `url_processing` job at startup.
    #[arg(long)]
    seed_url: Option<String>,

    /// How many seconds to run before exiting; omit to run indefinitely.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let config = common::config::load_config().unwrap_or_else(|err| {
        warn!(error = %err, "failed to load configuration, falling back to defaults");
        EngineConfig::default()
    });

    let (ai_client, vector_store, relational_store) = new_fake_stack();
    let url_fetcher: Arc<dyn URLFetcher> = Arc::new(FakeUrlFetcher {
        body: "This demonstration worker has no real fetcher configured; \
               supply one backed by an HTTP client for production use."
            .to_string(),
    });
    let parser: Arc<dyn DocumentParser> = Arc::new(FakePlainTextParser);

    let progress = ProgressBus::new();
    let sessions = SessionTracker::new();
    let store = InMemoryJobStore::shared();
    let queue = Arc::new(JobQueue::new(store, progress.clone(), sessions, config.clone()));

    let context_engine = Arc::new(ContextEngine::new(
        ai_client.clone(),
        config.context_max_tokens,
        config.context_temperature,
        config.context_batch_size(),
    ));
    let embedding_binder = Arc::new(EmbeddingBinder::new(ai_client.clone()));
    let persistence = Arc::new(PersistenceCoordinator::new(relational_store, vector_store));
    let pipeline = Arc::new(DocumentPipeline::new(
        ai_client,
        context_engine,
        embedding_binder,
        persistence.clone(),
        progress.clone(),
    ));

    let recovered = queue.recover().await?;
    if recovered > 0 {
        info!(recovered, "recovered orphaned jobs from a previous run");
    }

    if let Some(url) = args.seed_url {
        let options = JobOptions {
            enable_contextual_embeddings: config.context_embeddings_enabled,
            ..JobOptions::default()
        };
        let job = queue
            .submit(JobInput::Url { url: url.clone() }, options, "cli-session")
            .await?;
        info!(job_id = %job.job_id, url, "seeded job");
    }

    spawn_progress_subscriber(queue.clone(), progress.subscribe());
    spawn_heartbeat_timer(queue.clone(), config.heartbeat_interval());
    spawn_cleanup_sweeper(queue.clone(), config.cleanup_interval());

    let dispatcher = spawn_dispatcher(
        queue.clone(),
        pipeline,
        url_fetcher,
        parser,
        persistence,
        config.max_file_size,
    );

    match args.run_for_secs {
        Some(secs) => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            dispatcher.abort();
        }
        None => {
            dispatcher.await??;
        }
    }

    Ok(())
}

/// Splits a large structured document into independent sub-jobs (component
/// C6's decision already made by `plan_split`): records a parent document
/// row with no chunks of its own, submits one `chapter_document_processing`
/// job per surviving section at the priority and stagger `build_descriptors`
/// assigns, and completes the parent job. Each sub-job runs the full
/// `DocumentPipeline` independently once the dispatcher claims it.
async fn dispatch_streaming_split(
    queue: &Arc<JobQueue>,
    persistence: &Arc<PersistenceCoordinator>,
    job: &ingestion_pipeline::model::Job,
    source_url: &str,
    kind: &str,
    sections: Vec<ingestion_pipeline::Section>,
) {
    let started = std::time::Instant::now();
    let section_count = sections.len();

    let mut parent = Document::new(source_url, kind);
    parent.record_kind = RecordKind::ParentDocument;
    parent.total_chunks = section_count;
    parent.mark_terminal(ProcessingStatus::Completed);
    let parent = persistence.upsert_document(parent.clone()).await.unwrap_or(parent);

    let descriptors = build_descriptors(sections, parent.id.clone(), source_url, kind, &job.options);

    for descriptor in descriptors {
        let queue = queue.clone();
        let mut options = descriptor.options;
        options.priority = descriptor.priority;
        let input = descriptor.input;
        let session_id = job.session_id.clone();
        let delay = descriptor.dispatch_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match queue.submit(input, options, session_id).await {
                Ok(sub_job) => info!(job_id = %sub_job.job_id, "dispatched streamed sub-job"),
                Err(err) => error!(error = %err, "failed to submit streamed sub-job"),
            }
        });
    }

    persistence
        .update_document_status(
            &parent.id,
            DocumentStatusUpdate {
                processing_status: Some("completed".to_string()),
                total_chunks: Some(section_count),
                title: Some(parent.title.clone()),
                summary_preview: Some(parent.summary_preview.clone()),
            },
        )
        .await;

    let result = JobResult {
        total_chunks: section_count,
        processed_chunks: 0,
        vector_stored: 0,
        document_id: Some(parent.id.clone()),
        processing_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    if let Err(err) = queue.complete(&job.job_id, result).await {
        error!(job_id = %job.job_id, error = %err, "failed to record streaming-split job outcome");
    }
}

/// Every progress event refreshes the owning job's heartbeat and the
/// owning session's progress clock (specification section 4.8's "every
/// progress event additionally refreshes the owning session's
/// `last_progress_update`").
fn spawn_progress_subscriber(queue: Arc<JobQueue>, mut rx: tokio::sync::broadcast::Receiver<ingestion_pipeline::ProgressEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => queue.observe_progress(&event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress subscriber lagged; events were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Independent periodic task refreshing `last_heartbeat` for every active
/// job, separate from progress-event-driven refreshes (section 4.7).
fn spawn_heartbeat_timer(queue: Arc<JobQueue>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for job_id in queue.active_job_ids().await {
                queue.heartbeat(&job_id).await;
            }
        }
    });
}

/// Independent periodic task failing jobs that exceed their absolute
/// deadline, heartbeat timeout, or progress timeout (section 4.7).
fn spawn_cleanup_sweeper(queue: Arc<JobQueue>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match queue.run_cleanup_sweep(Utc::now()).await {
                Ok(timed_out) if !timed_out.is_empty() => {
                    warn!(count = timed_out.len(), "cleanup sweep terminated stuck jobs");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "cleanup sweep failed"),
            }
        }
    });
}

/// The dispatcher: ticks roughly every second, claiming ready jobs up to
/// `max_concurrent_jobs` and spawning one task per claimed job to drive it
/// through `DocumentPipeline` (section 4.7's dispatch loop).
#[allow(clippy::too_many_arguments)]
fn spawn_dispatcher(
    queue: Arc<JobQueue>,
    pipeline: Arc<DocumentPipeline>,
    url_fetcher: Arc<dyn URLFetcher>,
    parser: Arc<dyn DocumentParser>,
    persistence: Arc<PersistenceCoordinator>,
    max_file_size: u64,
) -> tokio::task::JoinHandle<Result<(), IngestError>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let claimed = queue.dispatch_ready(Utc::now()).await?;
            for job in claimed {
                let queue = queue.clone();
                let pipeline = pipeline.clone();
                let url_fetcher = url_fetcher.clone();
                let parser = parser.clone();
                let persistence = persistence.clone();
                tokio::spawn(async move {
                    run_claimed_job(queue, pipeline, url_fetcher, parser, persistence, max_file_size, job).await;
                });
            }
        }
    })
}

/// Resolves a claimed job's content, drives it through the pipeline, and
/// reports the outcome back to the queue. File jobs whose parsed result
/// meets the streaming-split rule (component C6) are diverted into
/// `dispatch_streaming_split` instead of running through `DocumentPipeline`
/// directly: the parent job's only job is the split decision and dispatch.
#[allow(clippy::too_many_arguments)]
async fn run_claimed_job(
    queue: Arc<JobQueue>,
    pipeline: Arc<DocumentPipeline>,
    url_fetcher: Arc<dyn URLFetcher>,
    parser: Arc<dyn DocumentParser>,
    persistence: Arc<PersistenceCoordinator>,
    max_file_size: u64,
    claimed: ClaimedJob,
) {
    let ClaimedJob { job, cancellation } = claimed;

    let (content, source_url, content_type_tag) = match &job.input {
        JobInput::Url { url } => match url_fetcher.fetch(url, &FetchOptions::default()).await {
            Ok(fetched) => (fetched.content, url.clone(), fetched.kind),
            Err(err) => {
                warn!(job_id = %job.job_id, error = %err, "url fetch failed");
                let _ = queue
                    .fail(&job.job_id, &IngestError::SourceAcquisitionError(err.to_string()))
                    .await;
                return;
            }
        },
        JobInput::File { file, size } => {
            if *size > max_file_size {
                warn!(job_id = %job.job_id, size, max_file_size, "file job exceeds configured max_file_size");
                let _ = queue
                    .fail(
                        &job.job_id,
                        &IngestError::InvalidInput(format!(
                            "file size {size} bytes exceeds max_file_size {max_file_size} bytes"
                        )),
                    )
                    .await;
                return;
            }
            let bytes = match file.decode() {
                Ok(bytes) => bytes,
                Err(err) => {
                    let _ = queue
                        .fail(&job.job_id, &IngestError::InvalidInput(err.to_string()))
                        .await;
                    return;
                }
            };
            let parsed = match parser.parse(&bytes, &file.mime_type, &file.original_name).await {
                Ok(parsed) => parsed,
                Err(err) => {
                    let _ = queue
                        .fail(&job.job_id, &IngestError::SourceAcquisitionError(err.to_string()))
                        .await;
                    return;
                }
            };

            let source_url = format!("file://{}", file.original_name);
            if let Some(sections) = plan_split(&parsed, usize::try_from(*size).unwrap_or(usize::MAX)) {
                dispatch_streaming_split(&queue, &persistence, &job, &source_url, &parsed.kind, sections).await;
                return;
            }

            (parsed.content, source_url, parsed.kind)
        }
        JobInput::SubSection { content, synthesized_url, .. } => {
            (content.clone(), synthesized_url.clone(), "sub_section".to_string())
        }
    };

    let result = pipeline
        .process(
            &content,
            &source_url,
            &content_type_tag,
            &job.options,
            &job.job_id,
            &job.session_id,
            &cancellation,
        )
        .await;

    match result {
        Ok(outcome) => {
            let job_result = JobResult {
                total_chunks: outcome.total_chunks,
                processed_chunks: outcome.processed_chunks,
                vector_stored: outcome.vector_stored,
                document_id: outcome.document.map(|d| d.id),
                processing_ms: outcome.processing_ms,
            };
            let finished = if outcome.cancelled {
                queue.finish_cancelled(&job.job_id, job_result).await
            } else {
                queue.complete(&job.job_id, job_result).await
            };
            if let Err(err) = finished {
                error!(job_id = %job.job_id, error = %err, "failed to record job outcome");
            }
        }
        Err(err) => {
            error!(job_id = %job.job_id, error = %err, "pipeline execution failed");
            let _ = queue.fail(&job.job_id, &err).await;
        }
    }
}
