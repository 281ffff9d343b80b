use std::io::Read;
use std::sync::Arc;

use cask_hub::HubRegistry;
use cask_types::{ContentAddress, HashAlgorithm, Partition, SizedContentAddress};

use crate::error::StoreResult;

/// An open committed blob.
pub struct FetchedBlob {
    pub blob: SizedContentAddress,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for FetchedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedBlob").field("blob", &self.blob).finish()
    }
}

/// Content-addressed blob storage.
///
/// All implementations must satisfy these invariants:
/// - A blob is either absent or fully present under its canonical name;
///   readers never observe a partial write.
/// - Receiving the same content twice is idempotent.
/// - Nothing is retried internally; retry policy belongs to the caller.
/// - A successful receive is announced on the default partition's hub, then
///   on each mirror partition's hub in request order.
pub trait BlobStorage: Send + Sync {
    /// Receive `source` as the blob `claimed`, then mirror it into `mirrors`.
    fn receive_blob(
        &self,
        claimed: &ContentAddress,
        source: &mut dyn Read,
        mirrors: &[Partition],
    ) -> StoreResult<SizedContentAddress>;

    /// Size of a committed blob, or `None` if it is not stored.
    fn stat(&self, address: &ContentAddress) -> StoreResult<Option<SizedContentAddress>>;

    /// Open a committed blob for reading.
    fn fetch(&self, address: &ContentAddress) -> StoreResult<FetchedBlob>;

    /// Every committed blob of `algorithm` in the default partition, sorted.
    fn enumerate(&self, algorithm: HashAlgorithm) -> StoreResult<Vec<SizedContentAddress>>;

    /// The hubs on which receives are announced.
    fn hubs(&self) -> &Arc<HubRegistry>;

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        Ok(self.stat(address)?.is_some())
    }
}
