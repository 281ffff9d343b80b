use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid digest length for {algorithm}: expected {expected}, got {actual}")]
    InvalidLength {
        algorithm: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("malformed content address: {0}")]
    MalformedAddress(String),

    #[error("invalid partition name {name:?}: {reason}")]
    InvalidPartition { name: String, reason: String },
}
