use chrono::{DateTime, Utc};
use common::ids::new_id;
use serde::{Deserialize, Serialize};

/// Recognized, closed set of job options (specification section 6). Loose
/// option bags are deliberately not modeled; every field the core
/// understands is named here with its documented default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub enable_contextual_embeddings: bool,
    pub priority: i32,
    pub session_id: Option<String>,
    pub max_concurrent_chunks: Option<usize>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
            enable_contextual_embeddings: true,
            priority: 5,
            session_id: None,
            max_concurrent_chunks: None,
        }
    }
}

/// A base64-encoded file payload, serialized losslessly as a tagged envelope
/// rather than relying on a language-specific buffer type (redesign note in
/// specification section 9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileBytesEnvelope {
    pub kind: String,
    pub encoding: String,
    pub data: String,
    pub mime_type: String,
    pub original_name: String,
}

impl FileBytesEnvelope {
    #[must_use]
    pub fn encode(bytes: &[u8], mime_type: impl Into<String>, original_name: impl Into<String>) -> Self {
        use base64::Engine;
        Self {
            kind: "bytes".to_string(),
            encoding: "base64".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
            original_name: original_name.into(),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

/// The input a job carries, one of the three shapes described in section 6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobInput {
    Url { url: String },
    File { file: FileBytesEnvelope, size: u64 },
    SubSection {
        parent_document_id: String,
        section_index: usize,
        section_title: String,
        content: String,
        synthesized_url: String,
    },
}

/// The three job types named in the data model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    UrlProcessing,
    FileProcessing,
    ChapterDocumentProcessing,
}

impl JobInput {
    #[must_use]
    pub fn job_type(&self) -> JobType {
        match self {
            JobInput::Url { .. } => JobType::UrlProcessing,
            JobInput::File { .. } => JobType::FileProcessing,
            JobInput::SubSection { .. } => JobType::ChapterDocumentProcessing,
        }
    }
}

/// Job status, as observed externally. Terminal statuses are exactly
/// `completed | failed | cancelled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A serialized job-level error, distinct from the richer `IngestError` used
/// in-process; this is what gets persisted and handed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobErrorInfo {
    pub kind: String,
    pub message: String,
}

/// A serialized job-level result summary, mirroring `DocumentPipeline`'s
/// return shape (section 4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub vector_stored: usize,
    pub document_id: Option<String>,
    pub processing_ms: u64,
}

/// A durable ingestion job, matching the fields enumerated in specification
/// section 3, plus the lease bookkeeping (`worker_id`, `lease_expires_at`)
/// needed to tell a live in-flight job apart from an orphan after a crash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub session_id: String,
    pub job_type: JobType,
    pub input: JobInput,
    pub options: JobOptions,
    pub status: JobStatus,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<JobErrorInfo>,
    pub duration_ms: Option<u64>,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub dead_letter: bool,
}

impl Job {
    #[must_use]
    pub fn new(input: JobInput, options: JobOptions, session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let priority = options.priority;
        Self {
            job_id: new_id(),
            session_id: session_id.into(),
            job_type: input.job_type(),
            input,
            options,
            status: JobStatus::Queued,
            priority,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            retries: 0,
            next_retry_at: None,
            result: None,
            error: None,
            duration_ms: None,
            worker_id: None,
            lease_expires_at: None,
            dead_letter: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_envelope_roundtrips_losslessly() {
        let bytes = vec![0u8, 1, 2, 250, 255, 10, 13];
        let envelope = FileBytesEnvelope::encode(&bytes, "text/plain", "a.txt");
        assert_eq!(envelope.kind, "bytes");
        assert_eq!(envelope.encoding, "base64");
        let decoded = envelope.decode().expect("decode");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn job_options_defaults_match_specification() {
        let options = JobOptions::default();
        assert_eq!(options.chunk_size, 1000);
        assert_eq!(options.overlap, 100);
        assert!(options.enable_contextual_embeddings);
        assert_eq!(options.priority, 5);
    }

    #[test]
    fn new_job_starts_queued_with_zero_retries() {
        let job = Job::new(
            JobInput::Url { url: "https://example.org/a".into() },
            JobOptions::default(),
            "session-1",
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retries, 0);
        assert_eq!(job.job_type, JobType::UrlProcessing);
    }
}
