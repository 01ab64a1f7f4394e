use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-tunable knobs for a single fetch, defaulting to the values in
/// specification section 4.10.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_redirects: u32,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            timeout_secs: 30,
            retries: 3,
        }
    }
}

impl FetchOptions {
    /// Linear backoff: `retry_delay * attempt`, attempt starting at 1.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32, base: std::time::Duration) -> std::time::Duration {
        base * attempt
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub final_url: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub content: String,
    pub kind: String,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("url scheme must be http or https")]
    UnsupportedScheme,
    #[error("exceeded {0} redirects")]
    TooManyRedirects(u32),
    #[error("fetch timed out")]
    Timeout,
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout | FetchError::Network(_) | FetchError::Status(500..=599)
        )
    }
}

/// Retrieves `http`/`https` resources. Any other scheme is rejected before
/// a request is attempted.
#[async_trait]
pub trait URLFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedDocument, FetchError>;
}
