//! Hub consumer that records received blobs in an index.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cask_hub::{BlobReceived, Subscription};
use cask_types::{ContentAddress, Partition};

use crate::error::{IndexError, IndexResult};
use crate::traits::IndexStorage;

/// Key under which a blob's size is recorded.
pub fn have_key(address: &ContentAddress) -> String {
    format!("have:{address}")
}

/// Key under which a blob's arrival in a partition is recorded.
pub fn received_key(partition: &Partition, address: &ContentAddress) -> String {
    format!("recv:{partition}:{address}")
}

/// Writes one batch per [`BlobReceived`] event:
/// `have:<address>` = size and `recv:<partition>:<address>` = sequence.
#[derive(Clone)]
pub struct Indexer {
    storage: Arc<dyn IndexStorage>,
}

impl Indexer {
    pub fn new(storage: Arc<dyn IndexStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn IndexStorage> {
        &self.storage
    }

    /// Record a single event.
    pub fn index_event(&self, event: &BlobReceived) -> IndexResult<()> {
        let mut batch = self.storage.begin_batch();
        batch.set(have_key(event.address()), event.blob.size.to_string());
        batch.set(
            received_key(&event.partition, event.address()),
            event.sequence.to_string(),
        );
        self.storage.commit_batch(batch)
    }

    /// Index events until the subscription closes. Returns how many were
    /// indexed.
    ///
    /// Backends may block on file I/O, so each event is written on the
    /// blocking pool. A failed write is logged and skipped.
    pub async fn run(self, mut subscription: Subscription) -> u64 {
        let partition = subscription.partition().clone();
        info!(partition = %partition, "indexer started");
        let mut indexed = 0;
        while let Some(event) = subscription.recv().await {
            let indexer = self.clone();
            let address = event.address().clone();
            let result = tokio::task::spawn_blocking(move || indexer.index_event(&event))
                .await
                .map_err(|e| IndexError::Task(e.to_string()))
                .and_then(|r| r);
            match result {
                Ok(()) => {
                    indexed += 1;
                    debug!(partition = %partition, address = %address, "blob indexed");
                }
                Err(e) => warn!(partition = %partition, address = %address, error = %e, "indexing failed"),
            }
        }
        info!(partition = %partition, indexed, "indexer stopped");
        indexed
    }

    /// Run the indexer on its own task.
    pub fn spawn(self, subscription: Subscription) -> JoinHandle<u64> {
        tokio::spawn(self.run(subscription))
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer").finish_non_exhaustive()
    }
}
