use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single chapter-like unit recovered from a structured document, used by
/// the chunk pipeline's title hints and by the streaming splitter's section
/// extraction for `epub` kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub title: String,
    pub length: usize,
    pub word_count: usize,
}

/// Metadata a parser may attach alongside extracted text. `chapters` is only
/// populated for structured kinds (`epub`); other kinds leave it empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedMetadata {
    pub chapters: Vec<ChapterInfo>,
}

/// A parser's successful result: recovered text, the document kind it
/// classified the bytes as, and any structural metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub content: String,
    pub kind: String,
    pub metadata: ParsedMetadata,
}

/// The closed set of ways a parse attempt can fail (specification
/// section 4.10). The pipeline treats every variant as non-retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseFailureKind {
    #[error("document content is invalid for the declared mime type")]
    Invalid,
    #[error("document is encrypted")]
    Encrypted,
    #[error("document is password protected")]
    PasswordProtected,
    #[error("parsing timed out")]
    Timeout,
    #[error("mime type is not supported")]
    UnsupportedMime,
}

/// Converts raw bytes plus a declared mime type into text and structural
/// metadata. Implementations are format-specific (epub, pdf, docx, plain
/// text, html); the core only depends on this trait.
#[async_trait]
pub trait Parser: Send + Sync {
    async fn parse(
        &self,
        bytes: &[u8],
        mime: &str,
        original_name: &str,
    ) -> Result<ParsedDocument, ParseFailureKind>;
}
