//! Writes chunk metadata to the relational store and embeddings to the
//! vector store (component C4).
//!
//! The two writes are independent: there is no cross-store transaction.
//! Vector-store failure for a chunk is logged and surfaced as a chunk-level
//! event but never fails the whole document; the same holds for relational
//! failures. Reconciliation across stores is the caller's responsibility via
//! `chunk_id` identity (specification section 4.4).

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use crate::external::relational_store::{ChunkRow, DocumentStatusUpdate, RelationalStore};
use crate::external::vector_store::VectorStore;
use crate::model::Document;

/// Outcome of persisting one chunk, reported back to the pipeline so it can
/// update counters without re-deriving store-specific failure details.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkPersistOutcome {
    pub relational_stored: bool,
    pub vector_stored: bool,
}

/// Adapts the `RelationalStore`/`VectorStore` traits (C10/C11) behind the
/// single surface the document pipeline calls into.
pub struct PersistenceCoordinator {
    relational_store: Arc<dyn RelationalStore>,
    vector_store: Arc<dyn VectorStore>,
}

impl PersistenceCoordinator {
    #[must_use]
    pub fn new(relational_store: Arc<dyn RelationalStore>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            relational_store,
            vector_store,
        }
    }

    /// Creates or updates the document row. Failure here is non-fatal to the
    /// caller: the pipeline continues without a persisted parent document.
    pub async fn upsert_document(&self, document: Document) -> Option<Document> {
        match self.relational_store.upsert_document(document).await {
            Ok(doc) => Some(doc),
            Err(err) => {
                error!(error = %err, "document upsert failed; pipeline continues without a persisted document row");
                None
            }
        }
    }

    pub async fn update_document_status(&self, document_id: &str, fields: DocumentStatusUpdate) {
        if let Err(err) = self
            .relational_store
            .update_document_status(document_id, fields)
            .await
        {
            error!(document_id, error = %err, "document status update failed");
        }
    }

    /// Writes a chunk's embedding to the vector store (spec section 4.4's
    /// `store_vector`). Must be called, and its result observed, *before*
    /// building the chunk row that will be passed to
    /// [`PersistenceCoordinator::store_chunk`]: invariant #1 (section 8)
    /// requires `embedding_status = completed` to track whether the vector
    /// actually landed, not whether embedding generation merely succeeded.
    pub async fn store_vector(&self, chunk_id: &str, vector: &[f32], payload: Value) -> bool {
        match self.vector_store.upsert(chunk_id, vector, payload).await {
            Ok(()) => true,
            Err(err) => {
                warn!(chunk_id, error = %err, "vector store write failed");
                false
            }
        }
    }

    /// Writes the chunk row to the relational store (spec section 4.4's
    /// `store_chunk`). Failure is logged and leaves the chunk counted as
    /// unprocessed; it never fails the document.
    pub async fn store_chunk(&self, row: ChunkRow) -> bool {
        let chunk_id = row.chunk_id.clone();
        match self.relational_store.insert_chunk(row).await {
            Ok(()) => true,
            Err(err) => {
                warn!(chunk_id, error = %err, "relational chunk insert failed");
                false
            }
        }
    }

    /// Writes both the chunk row and its vector, independently. Neither
    /// failure propagates; the returned outcome tells the caller which
    /// writes actually landed.
    ///
    /// Convenience wrapper kept for callers that don't need to reflect the
    /// vector-store outcome back into the row itself (see `store_vector`'s
    /// doc comment for why the document pipeline calls the two steps
    /// separately instead).
    pub async fn persist_chunk(
        &self,
        row: ChunkRow,
        vector: Option<&[f32]>,
        vector_payload: Value,
    ) -> ChunkPersistOutcome {
        let mut outcome = ChunkPersistOutcome::default();

        if let Some(vector) = vector {
            outcome.vector_stored = self.store_vector(&row.chunk_id, vector, vector_payload).await;
        }

        outcome.relational_stored = self.store_chunk(row).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::relational_store::RelationalStoreError;
    use crate::external::vector_store::VectorStoreError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FailingVectorStore;

    #[async_trait]
    impl VectorStore for FailingVectorStore {
        async fn upsert(&self, _chunk_id: &str, _vector: &[f32], _payload: Value) -> Result<(), VectorStoreError> {
            Err(VectorStoreError("unavailable".to_string()))
        }

        async fn delete(&self, _chunk_id: &str) -> Result<(), VectorStoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRelationalStore {
        inserted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelationalStore for RecordingRelationalStore {
        async fn upsert_document(&self, document: Document) -> Result<Document, RelationalStoreError> {
            Ok(document)
        }

        async fn insert_chunk(&self, row: ChunkRow) -> Result<(), RelationalStoreError> {
            self.inserted.lock().await.push(row.chunk_id);
            Ok(())
        }

        async fn update_document_status(
            &self,
            _document_id: &str,
            _fields: DocumentStatusUpdate,
        ) -> Result<(), RelationalStoreError> {
            Ok(())
        }

        async fn query(&self, _sql: &str, _params: Value) -> Result<Vec<Value>, RelationalStoreError> {
            Ok(Vec::new())
        }

        async fn transaction(&self, _ops: Vec<ChunkRow>) -> Result<(), RelationalStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn vector_store_failure_does_not_prevent_relational_write() {
        let coordinator = PersistenceCoordinator::new(
            Arc::new(RecordingRelationalStore::default()),
            Arc::new(FailingVectorStore),
        );
        let row = ChunkRow {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            chunk_index: 0,
            chunk_text: "hello".to_string(),
            contextual_summary: None,
            analysis: None,
            enhanced_metadata: serde_json::json!({}),
            embedding_status: crate::model::EmbeddingStatus::Completed,
            processing_status: crate::model::ProcessingStatus::Completed,
            uses_contextual_embedding: false,
            record_kind: crate::model::RecordKind::Chunk,
        };
        let outcome = coordinator
            .persist_chunk(row, Some(&[1.0, 2.0]), serde_json::json!({}))
            .await;
        assert!(!outcome.vector_stored);
        assert!(outcome.relational_stored);
    }
}
