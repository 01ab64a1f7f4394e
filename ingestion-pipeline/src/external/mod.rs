//! Capability traits the core consumes but does not implement (C10/C11):
//! format parsing, remote fetch, and the three store-shaped backends.

pub mod ai_client;
pub mod parser;
pub mod relational_store;
pub mod url_fetcher;
pub mod vector_store;

pub use ai_client::{AIClient, AIClientError, CompletionOptions};
pub use parser::{ChapterInfo, ParseFailureKind, Parser, ParsedDocument, ParsedMetadata};
pub use relational_store::{ChunkRow, DocumentStatusUpdate, RelationalStore, RelationalStoreError};
pub use url_fetcher::{FetchError, FetchMetadata, FetchOptions, FetchedDocument, URLFetcher};
pub use vector_store::{VectorStore, VectorStoreError};
