use thiserror::Error;
use tokio::task::JoinError;

/// Error taxonomy for the ingestion engine.
///
/// Variants map onto the error kinds a caller is expected to branch on
/// (retryable vs. terminal, cancellation vs. genuine failure) rather than onto
/// the library that happened to produce them.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("source acquisition failed: {0}")]
    SourceAcquisitionError(String),

    #[error("transient external error: {0}")]
    TransientExternalError(String),

    #[error("permanent external error: {0}")]
    PermanentExternalError(String),

    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("task join error: {0}")]
    Join(#[from] JoinError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Whether the queue should schedule a retry for a job that failed with
    /// this error, as opposed to treating it as immediately terminal.
    ///
    /// `Timeout` is deliberately excluded: the cleanup sweep's three liveness
    /// clocks (deadline, heartbeat, progress) exist to terminate a job that
    /// has stopped making verifiable progress, not to give it another
    /// attempt, and the taxonomy keeps it a distinct kind from
    /// `TransientExternalError` rather than folding it into the transient
    /// bucket.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::TransientExternalError(_))
    }

    /// Whether this error represents an explicit cancellation rather than a
    /// failure; cancellations are never retried.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, IngestError::Cancelled(_))
    }
}
