//! Error types for the index crate.

use std::io;
use std::path::PathBuf;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Keys must be non-empty.
    #[error("invalid index key: {0:?}")]
    InvalidKey(String),

    /// Reading or writing a persistent index failed.
    #[error("index I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A persisted snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The indexing task could not be run.
    #[error("indexer task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
