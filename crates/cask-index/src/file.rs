//! Persistent index stored as a JSON snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::traits::{apply, validate_key, BatchMutation, IndexStorage, Mutation};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// An [`IndexStorage`] persisted to a single JSON file.
///
/// Every mutation writes a complete new snapshot to a temp file next to the
/// index and renames it over the old one. A crash leaves either the previous
/// or the new snapshot, never a mix, so batches are all-or-nothing on disk.
/// The in-memory view is only updated after the rename succeeds.
///
/// Each mutation costs a rewrite of the whole index, so this backend suits
/// small indexes. The indexer commits one batch per received blob, which
/// makes building an index of N blobs quadratic in N.
#[derive(Debug)]
pub struct FileIndexStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileIndexStorage {
    /// Open the index at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(IndexError::Serialization(format!(
                        "unsupported index snapshot version {}",
                        snapshot.version
                    )));
                }
                snapshot.entries
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        debug!(path = %path.display(), entries = entries.len(), "index opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `mutations` to a copy, persist it, then publish it.
    fn mutate(&self, mutations: Vec<Mutation>) -> IndexResult<()> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        let mut next = entries.clone();
        apply(&mut next, mutations)?;
        self.persist(next.clone())?;
        *entries = next;
        Ok(())
    }

    fn persist(&self, entries: BTreeMap<String, String>) -> IndexResult<()> {
        let io_err = |source: io::Error| IndexError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries,
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".cask-index")
            .tempfile_in(dir)
            .map_err(io_err)?;
        serde_json::to_writer_pretty(temp.as_file_mut(), &snapshot)?;
        temp.as_file_mut().flush().map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        debug!(path = %self.path.display(), entries = snapshot.entries.len(), "index snapshot written");
        Ok(())
    }
}

impl IndexStorage for FileIndexStorage {
    fn get(&self, key: &str) -> IndexResult<Option<String>> {
        Ok(self.entries.lock().expect("lock poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        validate_key(key)?;
        self.mutate(vec![Mutation::Set {
            key: key.to_string(),
            value: value.to_string(),
        }])
    }

    fn delete(&self, key: &str) -> IndexResult<()> {
        validate_key(key)?;
        self.mutate(vec![Mutation::Delete {
            key: key.to_string(),
        }])
    }

    fn commit_batch(&self, batch: BatchMutation) -> IndexResult<()> {
        self.mutate(batch.into_mutations())
    }
}
