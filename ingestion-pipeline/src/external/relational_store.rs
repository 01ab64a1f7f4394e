use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Document, EmbeddingStatus, ProcessingStatus, RecordKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("relational store error: {0}")]
pub struct RelationalStoreError(pub String);

/// A row-shaped insert for a single chunk, carrying whatever enrichment and
/// enhanced metadata was produced during processing (section 4.5 step 4).
///
/// Carries the same durability/lifecycle fields the in-memory `Chunk` tracks
/// (`embedding_status`, `processing_status`, `uses_contextual_embedding`) so
/// a store can answer the consistency check in specification section 8 ("for
/// every chunk with `embedding_status = completed`, a vector with that
/// `chunk_id` exists") without reaching back into process memory, and
/// `record_kind` so chunk rows are distinguishable from document rows in a
/// shared table.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub contextual_summary: Option<String>,
    pub analysis: Option<Value>,
    pub enhanced_metadata: Value,
    pub embedding_status: EmbeddingStatus,
    pub processing_status: ProcessingStatus,
    pub uses_contextual_embedding: bool,
    pub record_kind: RecordKind,
}

/// Sparse field update applied via `update_document_status`, matching the
/// idempotent `WHERE url = ? AND record_kind = 'document'` update pattern
/// described in section 5.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DocumentStatusUpdate {
    pub processing_status: Option<String>,
    pub total_chunks: Option<usize>,
    pub title: Option<String>,
    pub summary_preview: Option<String>,
}

/// The relational persistence surface the pipeline consumes. `query` and
/// `transaction` are escape hatches for callers needing store-specific
/// access; the pipeline core only calls the three structured operations.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn upsert_document(&self, document: Document) -> Result<Document, RelationalStoreError>;

    async fn insert_chunk(&self, row: ChunkRow) -> Result<(), RelationalStoreError>;

    async fn update_document_status(
        &self,
        document_id: &str,
        fields: DocumentStatusUpdate,
    ) -> Result<(), RelationalStoreError>;

    async fn query(&self, sql: &str, params: Value) -> Result<Vec<Value>, RelationalStoreError>;

    async fn transaction(
        &self,
        ops: Vec<ChunkRow>,
    ) -> Result<(), RelationalStoreError>;
}
