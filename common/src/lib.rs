#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod config;
pub mod error;
pub mod ids;

pub use config::EngineConfig;
pub use error::IngestError;
