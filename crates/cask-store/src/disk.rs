use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};
use walkdir::WalkDir;

use cask_hub::HubRegistry;
use cask_types::{ContentAddress, HashAlgorithm, Partition, SizedContentAddress};

use crate::error::{StoreError, StoreResult};
use crate::layout::{ensure_directory, DiskLayout};
use crate::mirror::{MirrorStrategy, PartitionMirror};
use crate::receive::{commit_blob, ReceiveStage};
use crate::traits::{BlobStorage, FetchedBlob};

/// Configuration for [`DiskStorage`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage root; created if missing.
    pub root: PathBuf,
    /// How blobs are placed into mirror partitions.
    #[serde(default)]
    pub mirror_strategy: MirrorStrategy,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mirror_strategy: MirrorStrategy::default(),
        }
    }
}

/// Blob storage on a local filesystem.
///
/// Concurrent receives need no coordination: each writes its own uniquely
/// named temp file, and the rename into the canonical path is atomic.
/// Concurrent receives of the same address both succeed with equal results.
pub struct DiskStorage {
    config: StorageConfig,
    layout: DiskLayout,
    hubs: Arc<HubRegistry>,
}

impl DiskStorage {
    /// Open (or create) a store rooted at `config.root`.
    pub fn new(config: StorageConfig, hubs: Arc<HubRegistry>) -> StoreResult<Self> {
        ensure_directory(&config.root).map_err(|source| StoreError::StorageUnavailable {
            path: config.root.clone(),
            source,
        })?;
        info!(
            root = %config.root.display(),
            strategy = ?config.mirror_strategy,
            "disk storage opened"
        );
        Ok(Self {
            layout: DiskLayout::new(&config.root),
            config,
            hubs,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn layout(&self) -> &DiskLayout {
        &self.layout
    }

    /// Generic convenience over [`BlobStorage::receive_blob`].
    pub fn receive<R: Read>(
        &self,
        claimed: &ContentAddress,
        mut source: R,
        mirrors: &[Partition],
    ) -> StoreResult<SizedContentAddress> {
        self.receive_blob(claimed, &mut source, mirrors)
    }

    /// Announce `blob` on the default hub, then each mirror's hub in order.
    fn announce(&self, blob: &SizedContentAddress, mirrors: &[Partition]) {
        self.hubs.default_hub().notify_blob_received(blob);
        for partition in mirrors {
            self.hubs.hub(partition).notify_blob_received(blob);
        }
    }
}

/// Reject the default partition and drop repeats, keeping request order.
fn mirror_targets(mirrors: &[Partition]) -> StoreResult<Vec<Partition>> {
    let mut targets: Vec<Partition> = Vec::with_capacity(mirrors.len());
    for partition in mirrors {
        if partition.is_default() {
            return Err(StoreError::InvalidPartition(partition.clone()));
        }
        if !targets.contains(partition) {
            targets.push(partition.clone());
        }
    }
    Ok(targets)
}

impl BlobStorage for DiskStorage {
    fn receive_blob(
        &self,
        claimed: &ContentAddress,
        source: &mut dyn Read,
        mirrors: &[Partition],
    ) -> StoreResult<SizedContentAddress> {
        let mirrors = mirror_targets(mirrors)?;
        let committed = commit_blob(&self.layout, claimed, source)?;

        PartitionMirror::new(&self.layout, self.config.mirror_strategy)
            .mirror_all(&committed.path, &committed.blob, &mirrors)
            .inspect_err(|e| warn!(address = %claimed, error = %e, "mirroring failed"))?;
        trace!(address = %claimed, stage = %ReceiveStage::Mirrored);

        self.announce(&committed.blob, &mirrors);
        trace!(address = %claimed, stage = %ReceiveStage::Notified);

        info!(
            address = %claimed,
            size = committed.blob.size,
            mirrors = mirrors.len(),
            "blob received"
        );
        Ok(committed.blob)
    }

    fn stat(&self, address: &ContentAddress) -> StoreResult<Option<SizedContentAddress>> {
        let path = self.layout.file_for(address);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_file() => {
                Ok(Some(SizedContentAddress::new(address.clone(), meta.len())))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    fn fetch(&self, address: &ContentAddress) -> StoreResult<FetchedBlob> {
        let path = self.layout.file_for(address);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(address.clone()))
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        let size = file
            .metadata()
            .map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(FetchedBlob {
            blob: SizedContentAddress::new(address.clone(), size),
            reader: Box::new(file),
        })
    }

    fn enumerate(&self, algorithm: HashAlgorithm) -> StoreResult<Vec<SizedContentAddress>> {
        let base = self.layout.algorithm_root(algorithm);
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut blobs = Vec::new();
        // <algo>/<xx>/<yy>/<file>
        for entry in WalkDir::new(&base).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| StoreError::Read {
                path: e.path().map(|p| p.to_path_buf()).unwrap_or_else(|| base.clone()),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(address) = entry
                .file_name()
                .to_str()
                .and_then(DiskLayout::parse_file_name)
            else {
                continue;
            };
            if address.algorithm() != algorithm {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|e| StoreError::Read {
                    path: entry.path().to_path_buf(),
                    source: e.into(),
                })?
                .len();
            blobs.push(SizedContentAddress::new(address, size));
        }
        blobs.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(blobs)
    }

    fn hubs(&self) -> &Arc<HubRegistry> {
        &self.hubs
    }
}

impl std::fmt::Debug for DiskStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStorage")
            .field("root", &self.config.root)
            .field("mirror_strategy", &self.config.mirror_strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_crypto::digest;
    use cask_hub::HubConfig;

    fn storage() -> (tempfile::TempDir, DiskStorage) {
        let dir = tempfile::tempdir().unwrap();
        let hubs = Arc::new(HubRegistry::new(HubConfig::default()).unwrap());
        let storage = DiskStorage::new(StorageConfig::new(dir.path().join("blobs")), hubs).unwrap();
        (dir, storage)
    }

    fn p(name: &str) -> Partition {
        Partition::new(name).unwrap()
    }

    #[test]
    fn new_creates_root() {
        let (dir, storage) = storage();
        assert!(dir.path().join("blobs").is_dir());
        assert_eq!(storage.layout().root(), dir.path().join("blobs"));
    }

    #[test]
    fn stat_and_fetch() {
        let (_dir, storage) = storage();
        let data = b"fetch me";
        let addr = digest(HashAlgorithm::Sha256, data);

        assert_eq!(storage.stat(&addr).unwrap(), None);
        assert!(matches!(storage.fetch(&addr), Err(StoreError::NotFound(_))));

        storage.receive(&addr, &data[..], &[]).unwrap();
        assert_eq!(
            storage.stat(&addr).unwrap(),
            Some(SizedContentAddress::new(addr.clone(), data.len() as u64))
        );
        assert!(storage.contains(&addr).unwrap());

        let mut fetched = storage.fetch(&addr).unwrap();
        let mut body = Vec::new();
        fetched.reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, data);
        assert_eq!(fetched.blob.size, data.len() as u64);
    }

    #[test]
    fn enumerate_lists_committed_blobs_only() {
        let (_dir, storage) = storage();
        let mut expected = Vec::new();
        for data in [&b"one"[..], b"two", b"three"] {
            let addr = digest(HashAlgorithm::Sha1, data);
            expected.push(storage.receive(&addr, data, &[]).unwrap());
        }
        // Another algorithm and a stray temp file are not listed.
        let other = digest(HashAlgorithm::Blake3, b"one");
        storage.receive(&other, &b"one"[..], &[]).unwrap();
        let shard = storage.layout().directory_for(&expected[0].address);
        fs::write(
            shard.join(format!("{}abc", DiskLayout::temp_prefix(&expected[0].address))),
            b"junk",
        )
        .unwrap();

        expected.sort_by(|a, b| a.address.cmp(&b.address));
        assert_eq!(storage.enumerate(HashAlgorithm::Sha1).unwrap(), expected);
        assert_eq!(storage.enumerate(HashAlgorithm::Blake3).unwrap().len(), 1);
        assert!(storage.enumerate(HashAlgorithm::Sha256).unwrap().is_empty());
    }

    #[test]
    fn default_partition_is_not_a_mirror_target() {
        let (_dir, storage) = storage();
        let addr = digest(HashAlgorithm::Sha1, b"x");
        let err = storage
            .receive(&addr, &b"x"[..], &[Partition::default_partition()])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPartition(_)));
        // Rejected before any I/O.
        assert!(!storage.layout().file_for(&addr).exists());
    }

    #[test]
    fn notifies_default_then_mirrors_in_order() {
        let (_dir, storage) = storage();
        let mut default_sub = storage.hubs().default_hub().subscribe();
        let mut p1_sub = storage.hubs().hub(&p("p1")).subscribe();
        let mut p2_sub = storage.hubs().hub(&p("p2")).subscribe();

        let data = b"announce me";
        let addr = digest(HashAlgorithm::Sha1, data);
        let got = storage
            .receive(&addr, &data[..], &[p("p2"), p("p1"), p("p2")])
            .unwrap();

        for sub in [&mut default_sub, &mut p1_sub, &mut p2_sub] {
            let events = sub.drain();
            assert_eq!(events.len(), 1, "one event per partition");
            assert_eq!(events[0].blob, got);
        }
        assert_eq!(
            storage.hubs().partitions(),
            vec![Partition::default_partition(), p("p1"), p("p2")]
        );
    }

    #[test]
    fn failed_receive_notifies_nobody() {
        let (_dir, storage) = storage();
        let mut sub = storage.hubs().default_hub().subscribe();
        let addr = digest(HashAlgorithm::Sha1, b"expected");
        assert!(storage.receive(&addr, &b"different"[..], &[]).is_err());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn copy_strategy_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let hubs = Arc::new(HubRegistry::new(HubConfig::default()).unwrap());
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            mirror_strategy: MirrorStrategy::Copy,
        };
        let storage = DiskStorage::new(config, hubs).unwrap();
        let addr = digest(HashAlgorithm::Sha1, b"copy");
        storage.receive(&addr, &b"copy"[..], &[p("far")]).unwrap();
        let mirrored = storage.layout().mirror_file_for(&p("far"), &addr);
        assert_eq!(fs::read(mirrored).unwrap(), b"copy");
    }
}
