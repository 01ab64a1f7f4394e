//! In-memory test doubles for the external capability traits (C10/C11).
//!
//! These mirror the teacher's habit of standing up an in-process
//! `SurrealDbClient::memory` for tests, generalized here to trait objects
//! since the real stores are external per the specification. Used by this
//! crate's own unit/integration tests; kept public so downstream crates
//! (e.g. a worker binary) can exercise the pipeline without a real AI
//! provider or database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::external::ai_client::{AIClient, AIClientError, CompletionOptions};
use crate::external::parser::{ParseFailureKind, ParsedDocument, ParsedMetadata, Parser};
use crate::external::relational_store::{
    ChunkRow, DocumentStatusUpdate, RelationalStore, RelationalStoreError,
};
use crate::external::url_fetcher::{FetchError, FetchMetadata, FetchOptions, FetchedDocument, URLFetcher};
use crate::external::vector_store::{VectorStore, VectorStoreError};
use crate::model::{ChunkAnalysis, Document};

/// A deterministic stand-in for a real model provider. Every call succeeds
/// by default; tests flip the `AtomicBool` flags to exercise failure paths.
#[derive(Default)]
pub struct FakeAIClient {
    pub fail_analysis: AtomicBool,
    pub fail_embedding: AtomicBool,
    pub fail_summary: AtomicBool,
    pub fail_completion: AtomicBool,
    pub completion_retryable: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeAIClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AIClient for FakeAIClient {
    async fn analyze_chunk(&self, text: &str) -> Result<ChunkAnalysis, AIClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_analysis.load(Ordering::SeqCst) {
            return Err(AIClientError::permanent("analysis unavailable"));
        }
        Ok(ChunkAnalysis {
            sentiment: Some("neutral".to_string()),
            content_type: Some("prose".to_string()),
            technical_level: Some("general".to_string()),
            topics: vec!["topic".to_string()],
            entities: vec![],
        })
        .map(|mut analysis| {
            if text.is_empty() {
                analysis.topics.clear();
            }
            analysis
        })
    }

    async fn generate_summary(&self, _text: &str) -> Result<String, AIClientError> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(AIClientError::permanent("summary unavailable"));
        }
        Ok("a short summary".to_string())
    }

    async fn generate_embedding(&self, text: &str, context: Option<&str>) -> Result<Vec<f32>, AIClientError> {
        if self.fail_embedding.load(Ordering::SeqCst) {
            return Err(AIClientError::permanent("embedding unavailable"));
        }
        let seed = text.len() as f32 + context.map_or(0.0, |c| c.len() as f32);
        Ok(vec![seed, seed / 2.0])
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String, AIClientError> {
        if self.fail_completion.load(Ordering::SeqCst) {
            return if self.completion_retryable.load(Ordering::SeqCst) {
                Err(AIClientError::retryable("rate limited"))
            } else {
                Err(AIClientError::permanent("bad request"))
            };
        }
        Ok("a situating summary".to_string())
    }
}

/// An always-available vector store, or an always-failing one when
/// `fail_all` is set, matching the S3 end-to-end scenario.
#[derive(Default)]
pub struct FakeVectorStore {
    pub fail_all: AtomicBool,
    pub points: Mutex<HashMap<String, Vec<f32>>>,
}

impl FakeVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, chunk_id: &str) -> bool {
        self.points.lock().await.contains_key(chunk_id)
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn upsert(&self, chunk_id: &str, vector: &[f32], _payload: Value) -> Result<(), VectorStoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(VectorStoreError("vector store unavailable".to_string()));
        }
        self.points.lock().await.insert(chunk_id.to_string(), vector.to_vec());
        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> Result<(), VectorStoreError> {
        self.points.lock().await.remove(chunk_id);
        Ok(())
    }
}

/// An in-memory relational store, keyed by document id for documents and by
/// `(document_id, chunk_index)` for chunks.
#[derive(Default)]
pub struct FakeRelationalStore {
    pub documents: Mutex<HashMap<String, Document>>,
    pub chunks: Mutex<Vec<ChunkRow>>,
    pub fail_chunk_inserts: AtomicBool,
}

impl FakeRelationalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn chunk_count(&self) -> usize {
        self.chunks.lock().await.len()
    }
}

#[async_trait]
impl RelationalStore for FakeRelationalStore {
    async fn upsert_document(&self, document: Document) -> Result<Document, RelationalStoreError> {
        self.documents.lock().await.insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn insert_chunk(&self, row: ChunkRow) -> Result<(), RelationalStoreError> {
        if self.fail_chunk_inserts.load(Ordering::SeqCst) {
            return Err(RelationalStoreError("chunk insert unavailable".to_string()));
        }
        self.chunks.lock().await.push(row);
        Ok(())
    }

    async fn update_document_status(
        &self,
        document_id: &str,
        fields: DocumentStatusUpdate,
    ) -> Result<(), RelationalStoreError> {
        if let Some(document) = self.documents.lock().await.get_mut(document_id) {
            if let Some(total) = fields.total_chunks {
                document.total_chunks = total;
            }
            if let Some(title) = fields.title {
                document.title = title;
            }
            if let Some(summary) = fields.summary_preview {
                document.summary_preview = summary;
            }
        }
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: Value) -> Result<Vec<Value>, RelationalStoreError> {
        Ok(Vec::new())
    }

    async fn transaction(&self, ops: Vec<ChunkRow>) -> Result<(), RelationalStoreError> {
        self.chunks.lock().await.extend(ops);
        Ok(())
    }
}

/// Always returns a fixed body of the requested length, once per call.
pub struct FakeUrlFetcher {
    pub body: String,
}

#[async_trait]
impl URLFetcher for FakeUrlFetcher {
    async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<FetchedDocument, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::UnsupportedScheme);
        }
        Ok(FetchedDocument {
            content: self.body.clone(),
            kind: "text".to_string(),
            metadata: FetchMetadata {
                final_url: url.to_string(),
                status_code: 200,
            },
        })
    }
}

/// Echoes the input bytes back as UTF-8 text, tagging the kind from the
/// mime type's subtype. Good enough for pipeline-level tests that don't
/// exercise a specific format parser.
pub struct FakePlainTextParser;

#[async_trait]
impl Parser for FakePlainTextParser {
    async fn parse(&self, bytes: &[u8], mime: &str, _original_name: &str) -> Result<ParsedDocument, ParseFailureKind> {
        let content = String::from_utf8(bytes.to_vec()).map_err(|_| ParseFailureKind::Invalid)?;
        let kind = mime.split('/').nth(1).unwrap_or("text").to_string();
        Ok(ParsedDocument {
            content,
            kind,
            metadata: ParsedMetadata::default(),
        })
    }
}

#[must_use]
pub fn new_fake_stack() -> (Arc<FakeAIClient>, Arc<FakeVectorStore>, Arc<FakeRelationalStore>) {
    (
        Arc::new(FakeAIClient::new()),
        Arc::new(FakeVectorStore::new()),
        Arc::new(FakeRelationalStore::new()),
    )
}
