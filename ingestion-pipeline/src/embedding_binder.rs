//! Combines chunk text with optional context and requests an embedding
//! vector from the `AIClient` (component C3). Failures propagate to the
//! caller, unlike the context engine's best-effort contract.

use std::sync::Arc;

use crate::external::ai_client::{AIClient, AIClientError};

/// Thin adapter over [`AIClient::generate_embedding`]. Exists as its own
/// component so the document pipeline can reason about "bind chunk + context
/// into a vector" as a single step, independent of how embeddings are
/// actually produced.
pub struct EmbeddingBinder {
    ai_client: Arc<dyn AIClient>,
}

impl EmbeddingBinder {
    #[must_use]
    pub fn new(ai_client: Arc<dyn AIClient>) -> Self {
        Self { ai_client }
    }

    /// Produces an embedding for `chunk_text`, folding in `context` when
    /// present so the resulting vector reflects chunk-plus-context.
    pub async fn embed(
        &self,
        chunk_text: &str,
        context: Option<&str>,
    ) -> Result<Vec<f32>, AIClientError> {
        self.ai_client.generate_embedding(chunk_text, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkAnalysis;
    use async_trait::async_trait;
    use crate::external::ai_client::CompletionOptions;

    struct RecordingClient {
        seen_context: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl AIClient for RecordingClient {
        async fn analyze_chunk(&self, _text: &str) -> Result<ChunkAnalysis, AIClientError> {
            Ok(ChunkAnalysis::default())
        }

        async fn generate_summary(&self, _text: &str) -> Result<String, AIClientError> {
            Ok(String::new())
        }

        async fn generate_embedding(
            &self,
            text: &str,
            context: Option<&str>,
        ) -> Result<Vec<f32>, AIClientError> {
            *self.seen_context.lock().unwrap_or_else(|e| e.into_inner()) = context.map(str::to_string);
            Ok(vec![text.len() as f32])
        }

        async fn complete(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, AIClientError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn passes_context_through_when_present() {
        let client = Arc::new(RecordingClient {
            seen_context: std::sync::Mutex::new(None),
        });
        let binder = EmbeddingBinder::new(client.clone());
        let vector = binder.embed("hello", Some("situating summary")).await.expect("embed");
        assert_eq!(vector, vec![5.0]);
        assert_eq!(
            client.seen_context.lock().unwrap_or_else(|e| e.into_inner()).as_deref(),
            Some("situating summary")
        );
    }

    #[tokio::test]
    async fn omits_context_when_absent() {
        let client = Arc::new(RecordingClient {
            seen_context: std::sync::Mutex::new(None),
        });
        let binder = EmbeddingBinder::new(client.clone());
        binder.embed("hello", None).await.expect("embed");
        assert!(client.seen_context.lock().unwrap_or_else(|e| e.into_inner()).is_none());
    }
}
