//! In-memory index for testing and ephemeral use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::IndexResult;
use crate::traits::{apply, validate_key, BatchMutation, IndexStorage};

/// An in-memory implementation of [`IndexStorage`].
///
/// Entries live in a `BTreeMap` behind a `RwLock` and are lost when the index
/// is dropped. A batch is applied under a single write lock.
#[derive(Debug, Default)]
pub struct InMemoryIndexStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryIndexStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every entry, sorted by key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().expect("lock poisoned").clone()
    }
}

impl IndexStorage for InMemoryIndexStorage {
    fn get(&self, key: &str) -> IndexResult<Option<String>> {
        Ok(self.entries.read().expect("lock poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        validate_key(key)?;
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> IndexResult<()> {
        validate_key(key)?;
        self.entries.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    fn commit_batch(&self, batch: BatchMutation) -> IndexResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        apply(&mut entries, batch.into_mutations())
    }
}
