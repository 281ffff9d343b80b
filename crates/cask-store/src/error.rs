use std::io;
use std::path::PathBuf;

use cask_types::{ContentAddress, Partition};

use crate::receive::ReceiveStage;

/// Errors from blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A directory or temp file could not be created (permissions, disk full).
    #[error("storage unavailable at {}: {source}", .path.display())]
    StorageUnavailable { path: PathBuf, source: io::Error },

    /// Reading, writing, syncing or renaming failed while receiving.
    #[error("I/O error during {stage}: {source}")]
    Io {
        stage: ReceiveStage,
        source: io::Error,
    },

    /// The received bytes do not hash to the claimed address.
    #[error("corrupt blob: claimed {claimed}, computed {computed}")]
    CorruptBlob {
        claimed: ContentAddress,
        computed: ContentAddress,
    },

    /// The committed file is not what was written (wrong type or size).
    #[error("verification failed for {address}: {reason}")]
    VerificationFailed {
        address: ContentAddress,
        reason: String,
    },

    /// Creating a mirror partition's directory or link failed.
    #[error("mirror to partition {partition} failed: {source}")]
    MirrorFailed {
        partition: Partition,
        source: io::Error,
    },

    /// The requested blob is not stored.
    #[error("blob not found: {0}")]
    NotFound(ContentAddress),

    /// The default partition cannot be a mirror target.
    #[error("invalid mirror partition: {0}")]
    InvalidPartition(Partition),

    /// Reading committed storage failed outside the receive pipeline.
    #[error("read error at {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// Coarse classification of a [`StoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    StorageUnavailable,
    Io,
    CorruptBlob,
    VerificationFailed,
    MirrorFailed,
    NotFound,
    InvalidRequest,
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::StorageUnavailable { .. } => FailureKind::StorageUnavailable,
            Self::Io { .. } | Self::Read { .. } => FailureKind::Io,
            Self::CorruptBlob { .. } => FailureKind::CorruptBlob,
            Self::VerificationFailed { .. } => FailureKind::VerificationFailed,
            Self::MirrorFailed { .. } => FailureKind::MirrorFailed,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::InvalidPartition(_) => FailureKind::InvalidRequest,
        }
    }

    /// Whether the caller may retry the same receive with a fresh stream.
    ///
    /// A corrupt blob must never be retried with the same bytes.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Io | FailureKind::MirrorFailed)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
