//! Orchestrates one document end to end: parse result in, chunk, fan out
//! per chunk, persist, and report progress (component C5).

mod stages;
mod state;

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::info;

use crate::cancellation::CancellationFlag;
use crate::context_engine::ContextEngine;
use crate::embedding_binder::EmbeddingBinder;
use crate::external::ai_client::AIClient;
use crate::external::relational_store::DocumentStatusUpdate;
use crate::model::{Document, JobOptions, ProcessingStatus};
use crate::persistence::PersistenceCoordinator;
use crate::progress::{EventKind, ProgressBus, ProgressEvent};
use crate::IngestError;

use self::stages::{batch_concurrency, enter_batching, run_batching, run_chunking, run_documenting};
use self::state::ready;

/// Final tally returned by [`DocumentPipeline::process`], matching the
/// contract in specification section 4.5.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub vector_stored: usize,
    pub document: Option<Document>,
    pub processing_ms: u64,
    pub cancelled: bool,
}

/// Orchestrates C1 (chunker) through C4 (persistence) for a single
/// document, publishing progress events as it goes.
pub struct DocumentPipeline {
    ai_client: Arc<dyn AIClient>,
    context_engine: Arc<ContextEngine>,
    embedding_binder: Arc<EmbeddingBinder>,
    persistence: Arc<PersistenceCoordinator>,
    progress: ProgressBus,
}

impl DocumentPipeline {
    #[must_use]
    pub fn new(
        ai_client: Arc<dyn AIClient>,
        context_engine: Arc<ContextEngine>,
        embedding_binder: Arc<EmbeddingBinder>,
        persistence: Arc<PersistenceCoordinator>,
        progress: ProgressBus,
    ) -> Self {
        Self {
            ai_client,
            context_engine,
            embedding_binder,
            persistence,
            progress,
        }
    }

    /// Processes one document: chunk, upsert a document row, fan out
    /// chunk-level work in adaptively-sized batches, and finalize.
    ///
    /// Returns `Ok` even when individual chunks failed to analyze, embed, or
    /// persist — those failures are reflected in the returned counters and
    /// in per-chunk progress events, never propagated as an overall error.
    /// Only an invalid state transition (which cannot occur with this
    /// module's fixed stage sequence) would surface as `Err`.
    #[tracing::instrument(skip_all, fields(job_id, session_id, source_url))]
    pub async fn process(
        &self,
        content: &str,
        source_url: &str,
        content_type_tag: &str,
        options: &JobOptions,
        job_id: &str,
        session_id: &str,
        cancellation: &CancellationFlag,
    ) -> Result<PipelineOutcome, IngestError> {
        let started = Instant::now();

        self.progress.publish(ProgressEvent::new(
            job_id,
            session_id,
            EventKind::ProcessingStarted,
            json!({"source_url": source_url}),
        ));

        let machine = ready();
        let (machine, drafts) = run_chunking(machine, content, options)?;
        let total_chunks = drafts.len();

        self.progress.publish(ProgressEvent::new(
            job_id,
            session_id,
            EventKind::ChunkingComplete,
            json!({"count": total_chunks}),
        ));

        let (machine, document) = run_documenting(
            machine,
            self.ai_client.as_ref(),
            self.persistence.as_ref(),
            source_url,
            content_type_tag,
            content,
            total_chunks,
        )
        .await?;

        let machine = enter_batching(machine)?;

        let outcomes = run_batching(
            drafts,
            &document,
            job_id,
            session_id,
            options,
            &self.ai_client,
            &self.context_engine,
            &self.embedding_binder,
            &self.persistence,
            &self.progress,
            content,
            cancellation,
        )
        .await;

        let processed_chunks = outcomes.iter().filter(|o| o.processed).count();
        let vector_stored = outcomes.iter().filter(|o| o.vector_stored).count();
        let was_cancelled = cancellation.is_cancelled();

        let mut document = document;
        let terminal_status = if was_cancelled {
            ProcessingStatus::Cancelled
        } else {
            ProcessingStatus::Completed
        };
        document.mark_terminal(terminal_status);

        self.persistence
            .update_document_status(
                &document.id,
                DocumentStatusUpdate {
                    processing_status: Some(status_label(terminal_status).to_string()),
                    total_chunks: Some(total_chunks),
                    title: Some(document.title.clone()),
                    summary_preview: Some(document.summary_preview.clone()),
                },
            )
            .await;

        if was_cancelled {
            let _ = machine.cancel();
        } else {
            let _ = machine.finish();
        }

        let processing_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            job_id,
            session_id,
            total_chunks,
            processed_chunks,
            vector_stored,
            cancelled = was_cancelled,
            processing_ms,
            "document pipeline finished"
        );

        self.progress.publish(ProgressEvent::new(
            job_id,
            session_id,
            EventKind::ProcessingCompleted,
            json!({
                "total_chunks": total_chunks,
                "processed_chunks": processed_chunks,
                "vector_stored": vector_stored,
                "cancelled": was_cancelled,
            }),
        ));

        Ok(PipelineOutcome {
            total_chunks,
            processed_chunks,
            vector_stored,
            document: Some(document),
            processing_ms,
            cancelled: was_cancelled,
        })
    }
}

fn status_label(status: ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Processing => "processing",
        ProcessingStatus::Completed => "completed",
        ProcessingStatus::Failed => "failed",
        ProcessingStatus::Cancelled => "cancelled",
    }
}

/// Exposed for the job queue, which needs the same adaptive concurrency
/// rule when deciding how many sub-jobs of a streamed document it may run
/// alongside each other.
#[must_use]
pub fn adaptive_batch_concurrency(total_chunks: usize, max_concurrent: Option<usize>) -> usize {
    batch_concurrency(total_chunks, max_concurrent)
}
