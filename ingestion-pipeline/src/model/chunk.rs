use serde::{Deserialize, Serialize};

use super::document::ProcessingStatus;

/// Per-chunk durability flag: whether a vector with this chunk's id has been
/// written to the `VectorStore`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Pending,
    Completed,
    Failed,
    NotApplicable,
}

/// Opaque enrichment produced by `AIClient::analyze_chunk`. The core never
/// interprets these fields; it only threads them through to persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    pub sentiment: Option<String>,
    pub content_type: Option<String>,
    pub technical_level: Option<String>,
    pub topics: Vec<String>,
    pub entities: Vec<String>,
}

/// A chunk row, keyed uniquely within its document by `chunk_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub contextual_summary: Option<String>,
    pub analysis: Option<ChunkAnalysis>,
    pub uses_contextual_embedding: bool,
    pub embedding_status: EmbeddingStatus,
    pub processing_status: ProcessingStatus,
}

impl Chunk {
    #[must_use]
    pub fn new(document_id: impl Into<String>, chunk_index: i64, chunk_text: impl Into<String>) -> Self {
        Self {
            chunk_id: common::ids::new_id(),
            document_id: document_id.into(),
            chunk_index,
            chunk_text: chunk_text.into(),
            contextual_summary: None,
            analysis: None,
            uses_contextual_embedding: false,
            embedding_status: EmbeddingStatus::Pending,
            processing_status: ProcessingStatus::Processing,
        }
    }
}

/// Draft produced by the chunker, before enrichment, analysis, or an
/// assigned document id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub chunk_index: usize,
    pub chunk_text: String,
    pub section_title: Option<String>,
    pub section_level: Option<u8>,
    pub boundary: BoundaryKind,
}

/// What kind of textual boundary a chunk was split on; a structural hint
/// threaded through to enhanced metadata at persistence time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    Sentence,
    Paragraph,
    HardCut,
}
