use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use cask_types::Partition;

use crate::error::{HubError, Result};
use crate::hub::BlobHub;

/// Configuration shared by every hub of a registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of each per-subscriber queue.
    pub capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Process-wide set of hubs, one per partition, created on first use.
///
/// A registry lives as long as the server. It is passed to the storage layer
/// explicitly rather than reached through a global.
pub struct HubRegistry {
    config: HubConfig,
    hubs: RwLock<HashMap<Partition, Arc<BlobHub>>>,
}

impl HubRegistry {
    pub fn new(config: HubConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(HubError::InvalidCapacity(config.capacity));
        }
        Ok(Self {
            config,
            hubs: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The hub for `partition`, created if this is its first reference.
    pub fn hub(&self, partition: &Partition) -> Arc<BlobHub> {
        if let Some(hub) = self
            .hubs
            .read()
            .expect("registry lock poisoned")
            .get(partition)
        {
            return Arc::clone(hub);
        }

        let mut hubs = self.hubs.write().expect("registry lock poisoned");
        let capacity = self.config.capacity;
        let hub = hubs.entry(partition.clone()).or_insert_with(|| {
            debug!(partition = %partition, capacity, "creating hub");
            // Capacity was validated in `new`.
            Arc::new(BlobHub::with_valid_capacity(partition.clone(), capacity))
        });
        Arc::clone(hub)
    }

    /// The default partition's hub.
    pub fn default_hub(&self) -> Arc<BlobHub> {
        self.hub(&Partition::default_partition())
    }

    /// Partitions that currently have a hub, sorted by name.
    pub fn partitions(&self) -> Vec<Partition> {
        let mut partitions: Vec<Partition> = self
            .hubs
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        partitions.sort();
        partitions
    }

    /// Remove every subscriber from every hub, ending all subscriptions once
    /// they are drained. Returns how many were removed.
    pub fn close_all(&self) -> usize {
        let hubs: Vec<Arc<BlobHub>> = self
            .hubs
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        hubs.iter().map(|hub| hub.unsubscribe_all()).sum()
    }
}

impl std::fmt::Debug for HubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubRegistry")
            .field("config", &self.config)
            .field("partitions", &self.partitions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_types::{ContentAddress, HashAlgorithm, SizedContentAddress};

    fn registry() -> HubRegistry {
        HubRegistry::new(HubConfig::default()).unwrap()
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(HubRegistry::new(HubConfig { capacity: 0 }).is_err());
    }

    #[test]
    fn hubs_are_created_lazily_and_shared() {
        let reg = registry();
        assert!(reg.partitions().is_empty());

        let p1 = Partition::new("p1").unwrap();
        let a = reg.hub(&p1);
        let b = reg.hub(&p1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.partitions(), vec![p1]);
    }

    #[test]
    fn partitions_are_isolated() {
        let reg = registry();
        let mut default_sub = reg.default_hub().subscribe();
        let mut p1_sub = reg.hub(&Partition::new("p1").unwrap()).subscribe();

        let address = ContentAddress::new(HashAlgorithm::Sha1, [3u8; 20]).unwrap();
        reg.hub(&Partition::new("p1").unwrap())
            .notify_blob_received(&SizedContentAddress::new(address, 3));

        assert!(default_sub.try_recv().is_none());
        let event = p1_sub.try_recv().unwrap();
        assert_eq!(event.partition.as_str(), "p1");
    }

    #[tokio::test]
    async fn close_all_ends_subscriptions() {
        let reg = registry();
        let mut a = reg.default_hub().subscribe();
        let mut b = reg.hub(&Partition::new("p1").unwrap()).subscribe();
        let address = ContentAddress::new(HashAlgorithm::Sha1, [4u8; 20]).unwrap();
        reg.default_hub()
            .notify_blob_received(&SizedContentAddress::new(address, 4));

        assert_eq!(reg.close_all(), 2);
        assert!(a.recv().await.is_some());
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
        assert_eq!(reg.default_hub().subscriber_count(), 0);
    }
}
