use chrono::{DateTime, Utc};
use common::ids::new_id;
use serde::{Deserialize, Serialize};

/// Distinguishes an ordinary document row from a chunk row sharing the same
/// table, and from the synthetic parent row created for a streamed document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Chunk,
    Document,
    ParentDocument,
}

/// Lifecycle status shared by documents and jobs. Transitions are monotonic:
/// once a terminal state is reached it is sticky.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed | ProcessingStatus::Failed | ProcessingStatus::Cancelled
        )
    }
}

/// A document row as persisted by the relational store, per the data model in
/// section 3 of the specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub summary_preview: String,
    pub content_type_tag: String,
    pub total_chunks: usize,
    pub content_length: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub record_kind: RecordKind,
    pub parent_document_id: Option<String>,
}

impl Document {
    #[must_use]
    pub fn new(source_url: impl Into<String>, content_type_tag: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            source_url: source_url.into(),
            title: String::new(),
            summary_preview: String::new(),
            content_type_tag: content_type_tag.into(),
            total_chunks: 0,
            content_length: 0,
            created_at: now,
            updated_at: now,
            processing_status: ProcessingStatus::Processing,
            record_kind: RecordKind::Document,
            parent_document_id: None,
        }
    }

    /// Moves the document into a terminal status. No-op once already
    /// terminal, matching the invariant that terminal states are sticky.
    pub fn mark_terminal(&mut self, status: ProcessingStatus) {
        if self.processing_status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal(), "mark_terminal requires a terminal status");
        self.processing_status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_is_sticky() {
        let mut doc = Document::new("file://a", "text");
        doc.mark_terminal(ProcessingStatus::Completed);
        assert_eq!(doc.processing_status, ProcessingStatus::Completed);
        doc.mark_terminal(ProcessingStatus::Failed);
        assert_eq!(doc.processing_status, ProcessingStatus::Completed);
    }

    #[test]
    fn parent_document_has_no_embedding_by_construction() {
        let mut doc = Document::new("file://book.epub", "epub");
        doc.record_kind = RecordKind::ParentDocument;
        assert_eq!(doc.record_kind, RecordKind::ParentDocument);
    }
}
