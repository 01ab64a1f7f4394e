#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

//! The ingestion core: turns a fetched or uploaded document into persisted,
//! optionally contextualized and embedded chunks, under bounded concurrency
//! and with durable job tracking. Components C1-C9 live here; C10/C11 are
//! the external capability traits a caller (e.g. a worker binary) supplies.

pub mod cancellation;
pub mod chunker;
pub mod context_engine;
pub mod embedding_binder;
pub mod external;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod session_tracker;
pub mod streaming;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use common::IngestError;

pub use cancellation::CancellationFlag;
pub use chunker::{chunk, ChunkOptions};
pub use context_engine::{ContextEngine, ContextEngineStats, ContextRequest};
pub use embedding_binder::EmbeddingBinder;
pub use persistence::{ChunkPersistOutcome, PersistenceCoordinator};
pub use pipeline::{adaptive_batch_concurrency, DocumentPipeline, PipelineOutcome};
pub use progress::{EventKind, ProgressBus, ProgressEvent};
pub use queue::{ClaimedJob, InMemoryJobStore, JobQueue, JobStore};
pub use session_tracker::{SessionSnapshot, SessionTracker};
pub use streaming::{build_descriptors, plan_split, Section, SubJobDescriptor};
