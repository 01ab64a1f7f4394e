use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ChunkAnalysis;

/// Parameters for a raw completion call, used by `ContextEngine` and by the
/// document-level summary step.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.2,
        }
    }
}

/// A failure from the AI client, annotated with whether the caller should
/// retry it. Classification is the client's responsibility (section 4.10);
/// the core only inspects `is_retryable`.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("ai client error: {message}")]
pub struct AIClientError {
    pub message: String,
    pub retryable: bool,
}

impl AIClientError {
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// The model-backed operations the pipeline needs: per-chunk analysis,
/// document summaries, embeddings, and free-form completion (used by
/// `ContextEngine` to produce situating summaries).
#[async_trait]
pub trait AIClient: Send + Sync {
    async fn analyze_chunk(&self, text: &str) -> Result<ChunkAnalysis, AIClientError>;

    async fn generate_summary(&self, text: &str) -> Result<String, AIClientError>;

    async fn generate_embedding(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Result<Vec<f32>, AIClientError>;

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, AIClientError>;
}
