//! Produces a short contextual summary situating a chunk within its parent
//! document (component C2).
//!
//! Context generation is best-effort: any failure, retryable or not, yields
//! `Ok(None)` instead of propagating, so the document pipeline can fall back
//! to a non-contextual embedding for that chunk. Only retryable AI errors are
//! retried (up to three attempts, exponential backoff base 1s).

use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::external::ai_client::{AIClient, CompletionOptions};

/// Bound on the document-analysis LRU cache (specification section 4.2).
const CACHE_CAPACITY: usize = 100;
/// Maximum width of the document sample window handed to the completion
/// prompt, centered on the chunk's position.
const SAMPLE_WINDOW_CHARS: usize = 12_000;
/// Attempts for a retryable failure, including the first.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Cheap heuristics describing a document, cached per document fingerprint
/// so repeated chunks from the same document don't re-derive them.
///
/// `section_index` is the count of top-level markdown headings detected in
/// the document, a document-level structural count rather than a per-chunk
/// position; it is cached alongside the other heuristics since it is itself
/// derived once per document.
#[derive(Debug, Clone)]
struct DocumentAnalysis {
    document_type: String,
    structural_layout: String,
    top_keywords: Vec<String>,
    section_index: usize,
}

/// Per-call parameters narrowing the contextualization request to one chunk.
#[derive(Debug, Clone)]
pub struct ContextRequest<'a> {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_text: &'a str,
}

/// Running counters exposed for observability, matching the teacher's habit
/// of tracking request/success/latency counters on long-lived services.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextEngineStats {
    pub total_requests: u64,
    pub successes: u64,
    pub cache_hits: u64,
    pub total_latency_ms: u64,
}

impl ContextEngineStats {
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        if self.successes == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.successes as f64
        }
    }
}

/// Generates contextual summaries for chunks, backed by an `AIClient` and a
/// bounded cache of per-document heuristics.
pub struct ContextEngine {
    ai_client: Arc<dyn AIClient>,
    cache: Mutex<LruCache<String, DocumentAnalysis>>,
    stats: Mutex<ContextEngineStats>,
    max_tokens: u32,
    temperature: f32,
    /// Bounds how many `contextualize` calls are in flight at once, to the
    /// configured `context_batch_size` (specification section 5's context
    /// engine concurrency ceiling, default 5, max 20) — independent of the
    /// document pipeline's own per-document chunk batch concurrency.
    concurrency: Semaphore,
}

impl ContextEngine {
    #[must_use]
    pub fn new(ai_client: Arc<dyn AIClient>, max_tokens: u32, temperature: f32, batch_size: usize) -> Self {
        Self {
            ai_client,
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is non-zero"),
            )),
            stats: Mutex::new(ContextEngineStats::default()),
            max_tokens,
            temperature,
            concurrency: Semaphore::new(batch_size.max(1)),
        }
    }

    #[must_use]
    pub async fn stats(&self) -> ContextEngineStats {
        *self.stats.lock().await
    }

    /// Produces an optional 2-3 sentence summary situating `request.chunk_text`
    /// within `full_document`. Never returns an error: on any failure, or
    /// after retries are exhausted, this returns `None`.
    #[tracing::instrument(skip(self, full_document), fields(chunk_index = request.chunk_index))]
    pub async fn contextualize(
        &self,
        full_document: &str,
        request: ContextRequest<'_>,
    ) -> Option<String> {
        let _permit = self
            .concurrency
            .acquire()
            .await
            .expect("semaphore is never closed");

        let fingerprint = document_fingerprint(full_document);
        let analysis = self.analysis_for(full_document, &fingerprint).await;
        let sample = sample_window(full_document, request.chunk_index, request.total_chunks);

        let prompt = build_prompt(&analysis, &sample, request.chunk_text);

        let started = Instant::now();
        {
            let mut stats = self.stats.lock().await;
            stats.total_requests += 1;
        }

        let options = CompletionOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.ai_client.complete(&prompt, &options).await {
                Ok(summary) => {
                    let elapsed = started.elapsed();
                    let mut stats = self.stats.lock().await;
                    stats.successes += 1;
                    stats.total_latency_ms += elapsed.as_millis() as u64;
                    return Some(summary);
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "context generation failed; retrying"
                    );
                    sleep(backoff).await;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "context generation abandoned, falling back to non-contextual embedding");
                    return None;
                }
            }
        }
    }

    async fn analysis_for(&self, full_document: &str, fingerprint: &str) -> DocumentAnalysis {
        {
            let mut cache = self.cache.lock().await;
            if let Some(hit) = cache.get(fingerprint) {
                let mut stats = self.stats.lock().await;
                stats.cache_hits += 1;
                return hit.clone();
            }
        }

        let analysis = derive_document_analysis(full_document);
        let mut cache = self.cache.lock().await;
        cache.put(fingerprint.to_string(), analysis.clone());
        analysis
    }
}

fn document_fingerprint(full_document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_document.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cheap, local heuristics: no AI call is made to derive these, so caching
/// them is purely about avoiding repeated string scans across chunks of the
/// same document.
fn derive_document_analysis(full_document: &str) -> DocumentAnalysis {
    let document_type = if full_document.trim_start().starts_with('#') {
        "markdown".to_string()
    } else if full_document.contains("```") {
        "technical".to_string()
    } else {
        "prose".to_string()
    };

    let structural_layout = if full_document.lines().count() > 50 {
        "multi-section".to_string()
    } else {
        "flat".to_string()
    };

    let top_keywords = top_keywords(full_document, 5);
    let section_index = full_document.lines().filter(|line| line.trim_start().starts_with('#')).count();

    DocumentAnalysis {
        document_type,
        structural_layout,
        top_keywords,
        section_index,
    }
}

/// Naive frequency-based keyword extraction over unicode word boundaries,
/// skipping very short tokens. Good enough for prompt-grounding purposes;
/// the AI client is the one doing the real analysis.
fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for word in text.unicode_words() {
        if word.chars().count() < 4 {
            continue;
        }
        let lower = word.to_lowercase();
        *counts.entry(lower).or_insert(0) += 1;
    }
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().take(limit).map(|(word, _)| word).collect()
}

/// Centers a bounded sample window on the chunk's approximate position in
/// the document, so the prompt stays bounded regardless of document size.
fn sample_window(full_document: &str, chunk_index: usize, total_chunks: usize) -> String {
    let chars: Vec<char> = full_document.chars().collect();
    let total = chars.len();
    if total <= SAMPLE_WINDOW_CHARS {
        return full_document.to_string();
    }

    let position_fraction = if total_chunks == 0 {
        0.0
    } else {
        chunk_index as f64 / total_chunks as f64
    };
    let center = (position_fraction * total as f64) as usize;
    let half = SAMPLE_WINDOW_CHARS / 2;
    let start = center.saturating_sub(half);
    let end = (start + SAMPLE_WINDOW_CHARS).min(total);
    let start = end.saturating_sub(SAMPLE_WINDOW_CHARS).min(start);

    chars[start..end].iter().collect()
}

fn build_prompt(analysis: &DocumentAnalysis, sample: &str, chunk_text: &str) -> String {
    format!(
        "Document type: {}\nLayout: {}\nSections: {}\nKeywords: {}\n\nDocument excerpt:\n{}\n\nChunk:\n{}\n\nWrite a 2-3 sentence summary situating this chunk within the document.",
        analysis.document_type,
        analysis.structural_layout,
        analysis.section_index,
        analysis.top_keywords.join(", "),
        sample,
        chunk_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ai_client::AIClientError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        failures_before_success: u32,
        calls: AtomicU32,
        retryable: bool,
    }

    #[async_trait]
    impl AIClient for FlakyClient {
        async fn analyze_chunk(
            &self,
            _text: &str,
        ) -> Result<crate::model::ChunkAnalysis, AIClientError> {
            Ok(crate::model::ChunkAnalysis::default())
        }

        async fn generate_summary(&self, _text: &str) -> Result<String, AIClientError> {
            Ok(String::new())
        }

        async fn generate_embedding(
            &self,
            _text: &str,
            _context: Option<&str>,
        ) -> Result<Vec<f32>, AIClientError> {
            Ok(vec![0.0])
        }

        async fn complete(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, AIClientError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                if self.retryable {
                    Err(AIClientError::retryable("rate limited"))
                } else {
                    Err(AIClientError::permanent("bad request"))
                }
            } else {
                Ok("a situating summary".to_string())
            }
        }
    }

    #[tokio::test]
    async fn retries_retryable_errors_and_eventually_succeeds() {
        let client = Arc::new(FlakyClient {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
            retryable: true,
        });
        let engine = ContextEngine::new(client, 150, 0.2, 5);
        let request = ContextRequest {
            chunk_index: 0,
            total_chunks: 1,
            chunk_text: "chunk body",
        };
        let result = engine.contextualize("a document with enough words in it", request).await;
        assert_eq!(result.as_deref(), Some("a situating summary"));
        assert_eq!(engine.stats().await.successes, 1);
    }

    #[tokio::test]
    async fn non_retryable_errors_return_none_immediately() {
        let client = Arc::new(FlakyClient {
            failures_before_success: 1,
            calls: AtomicU32::new(0),
            retryable: false,
        });
        let engine = ContextEngine::new(client, 150, 0.2, 5);
        let request = ContextRequest {
            chunk_index: 0,
            total_chunks: 1,
            chunk_text: "chunk body",
        };
        let result = engine.contextualize("a document", request).await;
        assert!(result.is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_none() {
        let client = Arc::new(FlakyClient {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
            retryable: true,
        });
        let engine = ContextEngine::new(client, 150, 0.2, 5);
        let request = ContextRequest {
            chunk_index: 0,
            total_chunks: 1,
            chunk_text: "chunk body",
        };
        let result = engine.contextualize("a document", request).await;
        assert!(result.is_none());
        assert_eq!(client.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[test]
    fn top_keywords_skips_short_tokens() {
        let words = top_keywords("the cat sat on the mat with considerable enthusiasm", 3);
        assert!(words.iter().all(|w| w.chars().count() >= 4));
    }

    #[test]
    fn sample_window_is_bounded() {
        let doc: String = "word ".repeat(20_000);
        let sample = sample_window(&doc, 10, 20);
        assert!(sample.chars().count() <= SAMPLE_WINDOW_CHARS);
    }
}
