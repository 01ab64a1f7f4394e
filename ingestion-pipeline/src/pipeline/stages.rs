use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, warn};

use crate::cancellation::CancellationFlag;
use crate::chunker::{self, ChunkOptions};
use crate::context_engine::{ContextEngine, ContextRequest};
use crate::embedding_binder::EmbeddingBinder;
use crate::external::ai_client::AIClient;
use crate::external::relational_store::ChunkRow;
use crate::model::{
    BoundaryKind, Chunk, ChunkDraft, Document, EmbeddingStatus, JobOptions, ProcessingStatus, RecordKind,
};
use crate::persistence::PersistenceCoordinator;
use crate::progress::{EventKind, ProgressBus, ProgressEvent};

use state_machines::core::GuardError;

use super::state::{Batching, Chunking, Documenting, DocumentMachine, Ready};

fn map_guard_error(event: &str, guard: &GuardError) -> crate::IngestError {
    crate::IngestError::Internal(format!("invalid document pipeline transition during {event}: {guard:?}"))
}

/// Per-chunk pipeline outcome, the single normalized result shape the
/// document pipeline aggregates (redesign note in specification section 9:
/// normalize mixed error-return/thrown-error styles to one shape at the
/// per-chunk boundary).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkOutcome {
    pub processed: bool,
    pub stored: bool,
    pub vector_stored: bool,
}

/// Chunking stage: pure, cannot fail per specification section 4.1.
pub fn run_chunking(
    machine: DocumentMachine<(), Ready>,
    text: &str,
    options: &JobOptions,
) -> Result<(DocumentMachine<(), Chunking>, Vec<ChunkDraft>), crate::IngestError> {
    let drafts = chunker::chunk(
        text,
        ChunkOptions {
            target_size: options.chunk_size,
            overlap: options.overlap,
        },
    );
    let machine = machine
        .start_chunking()
        .map_err(|(_, guard)| map_guard_error("start_chunking", &guard))?;
    Ok((machine, drafts))
}

/// Documenting stage: extracts a title, generates a short summary (falling
/// back to a literal failure marker rather than propagating), and upserts
/// the document row. Document creation failure is non-fatal.
pub async fn run_documenting(
    machine: DocumentMachine<(), Chunking>,
    ai_client: &dyn AIClient,
    persistence: &PersistenceCoordinator,
    source_url: &str,
    content_type_tag: &str,
    full_text: &str,
    total_chunks: usize,
) -> Result<(DocumentMachine<(), Documenting>, Document), crate::IngestError> {
    let title = extract_title(full_text, source_url);
    let sample: String = full_text.chars().take(2_000).collect();
    let summary = match ai_client.generate_summary(&sample).await {
        Ok(summary) => summary,
        Err(err) => {
            warn!(error = %err, "document summary generation failed");
            "Summary generation failed".to_string()
        }
    };

    let mut document = Document::new(source_url, content_type_tag);
    document.title = title;
    document.summary_preview = summary;
    document.total_chunks = total_chunks;
    document.content_length = full_text.chars().count();

    let document = persistence.upsert_document(document.clone()).await.unwrap_or(document);

    let machine = machine
        .record_document()
        .map_err(|(_, guard)| map_guard_error("record_document", &guard))?;
    Ok((machine, document))
}

fn extract_title(full_text: &str, source_url: &str) -> String {
    full_text
        .lines()
        .find_map(|line| line.trim().strip_prefix('#').map(|rest| rest.trim_start_matches('#').trim().to_string()))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| url_basename(source_url))
}

fn url_basename(source_url: &str) -> String {
    source_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(source_url)
        .to_string()
}

/// Chooses the adaptive per-document batch concurrency from specification
/// section 4.5, bounded above by `max_concurrent` (an explicit override, or
/// the default of 3).
#[must_use]
pub fn batch_concurrency(total_chunks: usize, max_concurrent: Option<usize>) -> usize {
    let adaptive = if total_chunks > 1000 {
        1
    } else if total_chunks > 200 {
        1
    } else if total_chunks > 50 {
        2
    } else if total_chunks < 10 {
        3
    } else {
        2
    };
    adaptive.min(max_concurrent.unwrap_or(3)).max(1)
}

pub fn enter_batching(
    machine: DocumentMachine<(), Documenting>,
) -> Result<DocumentMachine<(), Batching>, crate::IngestError> {
    machine
        .start_batching()
        .map_err(|(_, guard)| map_guard_error("start_batching", &guard))
}

const CHUNK_TIMEOUT: Duration = Duration::from_secs(600);
const BATCH_PAUSE: Duration = Duration::from_millis(200);

/// Runs every batch in sequence, with up to `concurrency` chunks processed
/// concurrently within a batch. Returns the per-chunk outcomes for every
/// chunk that was *started*; chunks never reached because of cancellation
/// are simply absent from the returned vector.
#[allow(clippy::too_many_arguments)]
pub async fn run_batching(
    drafts: Vec<ChunkDraft>,
    document: &Document,
    job_id: &str,
    session_id: &str,
    options: &JobOptions,
    ai_client: &Arc<dyn AIClient>,
    context_engine: &Arc<ContextEngine>,
    embedding_binder: &Arc<EmbeddingBinder>,
    persistence: &Arc<PersistenceCoordinator>,
    progress: &ProgressBus,
    full_text: &str,
    cancellation: &CancellationFlag,
) -> Vec<ChunkOutcome> {
    let total = drafts.len();
    let concurrency = batch_concurrency(total, options.max_concurrent_chunks);
    let mut outcomes = Vec::with_capacity(total);

    let batches: Vec<Vec<ChunkDraft>> = drafts
        .chunks(concurrency)
        .map(<[ChunkDraft]>::to_vec)
        .collect();
    let batch_count = batches.len();

    for (batch_index, batch) in batches.into_iter().enumerate() {
        if cancellation.is_cancelled() {
            debug!(job_id, session_id, "cancellation observed before batch start");
            break;
        }

        let tasks = batch.into_iter().map(|draft| {
            let ai_client = Arc::clone(ai_client);
            let context_engine = Arc::clone(context_engine);
            let embedding_binder = Arc::clone(embedding_binder);
            let persistence = Arc::clone(persistence);
            let progress = progress.clone();
            let document_id = document.id.clone();
            let job_id = job_id.to_string();
            let session_id = session_id.to_string();
            let full_text = full_text.to_string();
            let enable_context = options.enable_contextual_embeddings;

            async move {
                let result = tokio::time::timeout(
                    CHUNK_TIMEOUT,
                    process_one_chunk(
                        draft,
                        &document_id,
                        &full_text,
                        total,
                        enable_context,
                        &ai_client,
                        &context_engine,
                        &embedding_binder,
                        &persistence,
                        &progress,
                        &job_id,
                        &session_id,
                    ),
                )
                .await;

                match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(job_id = %job_id, session_id = %session_id, "chunk processing timed out");
                        ChunkOutcome::default()
                    }
                }
            }
        });

        let batch_outcomes = futures::future::join_all(tasks).await;
        outcomes.extend(batch_outcomes);

        if batch_index + 1 < batch_count {
            tokio::time::sleep(BATCH_PAUSE).await;
        }
    }

    outcomes
}

#[allow(clippy::too_many_arguments)]
async fn process_one_chunk(
    draft: ChunkDraft,
    document_id: &str,
    full_text: &str,
    total_chunks: usize,
    enable_context: bool,
    ai_client: &Arc<dyn AIClient>,
    context_engine: &Arc<ContextEngine>,
    embedding_binder: &Arc<EmbeddingBinder>,
    persistence: &Arc<PersistenceCoordinator>,
    progress: &ProgressBus,
    job_id: &str,
    session_id: &str,
) -> ChunkOutcome {
    let started = Instant::now();
    let mut chunk = Chunk::new(document_id, draft.chunk_index as i64, draft.chunk_text.clone());

    let analysis = match ai_client.analyze_chunk(&draft.chunk_text).await {
        Ok(analysis) => Some(analysis),
        Err(err) => {
            warn!(job_id, session_id, chunk_index = draft.chunk_index, error = %err, "chunk analysis failed");
            None
        }
    };
    if analysis.is_none() {
        chunk.processing_status = ProcessingStatus::Failed;
        chunk.embedding_status = EmbeddingStatus::NotApplicable;

        let enhanced_metadata = json!({
            "chunking_method": boundary_label(draft.boundary),
            "section_title": draft.section_title,
            "section_level": draft.section_level,
            "document_position": (draft.chunk_index as f64 + 1.0) / total_chunks.max(1) as f64,
            "context_generation": false,
            "elapsed_ms": started.elapsed().as_millis() as u64,
        });
        let row = ChunkRow {
            chunk_id: chunk.chunk_id.clone(),
            document_id: document_id.to_string(),
            chunk_index: chunk.chunk_index,
            chunk_text: chunk.chunk_text.clone(),
            contextual_summary: None,
            analysis: None,
            enhanced_metadata,
            embedding_status: chunk.embedding_status,
            processing_status: chunk.processing_status,
            uses_contextual_embedding: false,
            record_kind: RecordKind::Chunk,
        };
        let vector_payload = json!({"chunk_index": chunk.chunk_index, "document_id": document_id});
        let persisted = persistence.persist_chunk(row, None, vector_payload).await;

        progress.publish(ProgressEvent::new(
            job_id,
            session_id,
            EventKind::ProgressUpdate,
            json!({"chunk_index": chunk.chunk_index, "event": "chunk_processed"}),
        ));

        return ChunkOutcome {
            processed: persisted.relational_stored,
            stored: persisted.relational_stored,
            vector_stored: false,
        };
    }
    chunk.analysis = analysis.clone();

    progress.publish(ProgressEvent::new(
        job_id,
        session_id,
        EventKind::AnalysisCompleted,
        json!({"chunk_index": draft.chunk_index}),
    ));

    let context = if enable_context {
        context_engine
            .contextualize(
                full_text,
                ContextRequest {
                    chunk_index: draft.chunk_index,
                    total_chunks,
                    chunk_text: &draft.chunk_text,
                },
            )
            .await
    } else {
        None
    };
    chunk.uses_contextual_embedding = context.is_some();
    chunk.contextual_summary = context.clone();

    let embedding = embedding_binder.embed(&draft.chunk_text, context.as_deref()).await;

    let vector = match embedding {
        Ok(vector) => {
            progress.publish(ProgressEvent::new(
                job_id,
                session_id,
                EventKind::EmbeddingCreated,
                json!({"chunk_index": draft.chunk_index}),
            ));
            Some(vector)
        }
        Err(err) => {
            warn!(job_id, session_id, chunk_index = draft.chunk_index, error = %err, "embedding generation failed");
            None
        }
    };

    // Vector store write happens first and its outcome, not merely whether
    // generation succeeded, decides `embedding_status` (invariant #1,
    // specification section 8: `embedding_status = completed` iff a vector
    // with a matching `chunk_id` exists in the VectorStore).
    let vector_payload = json!({"chunk_index": chunk.chunk_index, "document_id": document_id});
    let vector_stored = match vector.as_deref() {
        Some(v) => persistence.store_vector(&chunk.chunk_id, v, vector_payload).await,
        None => false,
    };

    chunk.embedding_status = if vector_stored {
        EmbeddingStatus::Completed
    } else {
        EmbeddingStatus::Failed
    };
    chunk.processing_status = ProcessingStatus::Completed;

    let enhanced_metadata = json!({
        "chunking_method": boundary_label(draft.boundary),
        "section_title": draft.section_title,
        "section_level": draft.section_level,
        "document_position": (draft.chunk_index as f64 + 1.0) / total_chunks.max(1) as f64,
        "context_generation": chunk.uses_contextual_embedding,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });

    let row = ChunkRow {
        chunk_id: chunk.chunk_id.clone(),
        document_id: document_id.to_string(),
        chunk_index: chunk.chunk_index,
        chunk_text: chunk.chunk_text.clone(),
        contextual_summary: chunk.contextual_summary.clone(),
        analysis: chunk.analysis.as_ref().and_then(|a| serde_json::to_value(a).ok()),
        enhanced_metadata,
        embedding_status: chunk.embedding_status,
        processing_status: chunk.processing_status,
        uses_contextual_embedding: chunk.uses_contextual_embedding,
        record_kind: RecordKind::Chunk,
    };

    let relational_stored = persistence.store_chunk(row).await;

    if !vector_stored && vector.is_some() {
        progress.publish(ProgressEvent::new(
            job_id,
            session_id,
            EventKind::VectorError,
            json!({"chunk_index": chunk.chunk_index}),
        ));
    } else if vector_stored {
        progress.publish(ProgressEvent::new(
            job_id,
            session_id,
            EventKind::VectorStored,
            json!({"chunk_index": chunk.chunk_index}),
        ));
    }

    progress.publish(ProgressEvent::new(
        job_id,
        session_id,
        EventKind::ProgressUpdate,
        json!({"chunk_index": chunk.chunk_index, "event": "chunk_processed"}),
    ));

    ChunkOutcome {
        processed: relational_stored,
        stored: relational_stored,
        vector_stored,
    }
}

fn boundary_label(boundary: BoundaryKind) -> &'static str {
    match boundary {
        BoundaryKind::Sentence => "sentence",
        BoundaryKind::Paragraph => "paragraph",
        BoundaryKind::HardCut => "hard_cut",
    }
}
