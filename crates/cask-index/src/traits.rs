//! The [`IndexStorage`] trait and the batch it commits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// One staged index operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Set { key: String, value: String },
    Delete { key: String },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// A set of staged mutations.
///
/// Nothing staged here is visible until the batch is handed to
/// [`IndexStorage::commit_batch`], which consumes it. Later mutations of the
/// same key win.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchMutation {
    mutations: Vec<Mutation>,
}

impl BatchMutation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `key` = `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.mutations.push(Mutation::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Stage removal of `key`.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.mutations.push(Mutation::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// Storage backend for the blob index.
///
/// Implementations must be thread-safe (`Send + Sync`). Single mutations are
/// visible as soon as they return `Ok`. A committed batch is applied as one
/// unit: readers see either none or all of its mutations.
pub trait IndexStorage: Send + Sync {
    /// Read a key. Returns `Ok(None)` if it is not set.
    fn get(&self, key: &str) -> IndexResult<Option<String>>;

    /// Set (create or overwrite) a key.
    fn set(&self, key: &str, value: &str) -> IndexResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> IndexResult<()>;

    /// Open an empty batch.
    fn begin_batch(&self) -> BatchMutation {
        BatchMutation::new()
    }

    /// Apply every mutation of `batch` atomically.
    ///
    /// On error nothing from the batch is applied.
    fn commit_batch(&self, batch: BatchMutation) -> IndexResult<()>;
}

pub(crate) fn validate_key(key: &str) -> IndexResult<()> {
    if key.is_empty() {
        return Err(IndexError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Validate every key first, then apply in order.
pub(crate) fn apply(
    entries: &mut BTreeMap<String, String>,
    mutations: Vec<Mutation>,
) -> IndexResult<()> {
    mutations.iter().try_for_each(|m| validate_key(m.key()))?;
    for mutation in mutations {
        match mutation {
            Mutation::Set { key, value } => {
                entries.insert(key, value);
            }
            Mutation::Delete { key } => {
                entries.remove(&key);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_order() {
        let mut batch = BatchMutation::new();
        batch.set("a", "1");
        batch.delete("a");
        batch.set("b", "2");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.mutations()[1], Mutation::Delete { key: "a".into() });

        let mut entries = BTreeMap::new();
        apply(&mut entries, batch.into_mutations()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["b"], "2");
    }

    #[test]
    fn invalid_key_applies_nothing() {
        let mut batch = BatchMutation::new();
        batch.set("ok", "1");
        batch.set("", "2");
        let mut entries = BTreeMap::new();
        assert!(matches!(
            apply(&mut entries, batch.into_mutations()),
            Err(IndexError::InvalidKey(_))
        ));
        assert!(entries.is_empty());
    }

    #[test]
    fn mutation_serde_shape() {
        let json = serde_json::to_string(&Mutation::Delete { key: "k".into() }).unwrap();
        assert_eq!(json, r#"{"op":"delete","key":"k"}"#);
    }
}
