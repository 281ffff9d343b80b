use serde::{Deserialize, Serialize};

use cask_types::{ContentAddress, Partition, SizedContentAddress};

/// Announcement that a blob is now present in a partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobReceived {
    /// Partition whose hub published the event.
    pub partition: Partition,
    /// The committed blob.
    pub blob: SizedContentAddress,
    /// Per-hub publish counter, starting at 1.
    pub sequence: u64,
}

impl BlobReceived {
    pub fn address(&self) -> &ContentAddress {
        &self.blob.address
    }
}
