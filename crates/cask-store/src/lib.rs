//! Local blob storage engine for cask.
//!
//! Blobs are stored once, under a path derived from their content address,
//! and optionally replicated into named mirror partitions. A successful
//! receive is announced on the partition hubs of [`cask_hub`].
//!
//! # Receive pipeline
//!
//! 1. Ensure the blob's shard directory exists.
//! 2. Open a uniquely named temp file in that directory.
//! 3. Stream the source into the temp file and a digester at once.
//! 4. Sync and close the temp file.
//! 5. Compare the digest with the claimed address.
//! 6. Rename the temp file onto the canonical path (the commit point).
//! 7. Re-stat the committed file and check its type and size.
//! 8. Mirror into each requested partition, then notify the hubs.
//!
//! A failure before step 6 leaves nothing behind: the temp file is removed
//! when it goes out of scope. A failure after step 6 leaves the committed
//! blob in place.
//!
//! # Modules
//!
//! - [`layout`] -- [`DiskLayout`], the durable path scheme
//! - [`receive`] -- the write-verify-commit pipeline
//! - [`mirror`] -- [`PartitionMirror`], hard-link or copy replication
//! - [`disk`] -- [`DiskStorage`], the [`BlobStorage`] implementation

pub mod disk;
pub mod error;
pub mod layout;
pub mod mirror;
pub mod receive;
pub mod traits;

pub use disk::{DiskStorage, StorageConfig};
pub use error::{FailureKind, StoreError, StoreResult};
pub use layout::DiskLayout;
pub use mirror::{MirrorOutcome, MirrorStrategy, PartitionMirror};
pub use receive::{CommittedBlob, ReceiveStage};
pub use traits::{BlobStorage, FetchedBlob};
