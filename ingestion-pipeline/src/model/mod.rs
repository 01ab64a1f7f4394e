pub mod chunk;
pub mod document;
pub mod job;
pub mod session;

pub use chunk::{BoundaryKind, Chunk, ChunkAnalysis, ChunkDraft, EmbeddingStatus};
pub use document::{Document, ProcessingStatus, RecordKind};
pub use job::{
    FileBytesEnvelope, Job, JobErrorInfo, JobInput, JobOptions, JobResult, JobStatus, JobType,
};
pub use session::{ProgressUpdate, Session};
