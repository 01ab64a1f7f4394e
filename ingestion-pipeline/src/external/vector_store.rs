use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("vector store error: {0}")]
pub struct VectorStoreError(pub String);

/// Durable vector storage, keyed by `chunk_id`. The pipeline treats every
/// failure here as a chunk-level, non-fatal event (section 4.4).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        payload: Value,
    ) -> Result<(), VectorStoreError>;

    async fn delete(&self, chunk_id: &str) -> Result<(), VectorStoreError>;
}
