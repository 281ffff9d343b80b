use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a partition name.
pub const MAX_PARTITION_NAME_LEN: usize = 64;

/// A named replication target for blobs.
///
/// Partitions carry no state of their own: a name is a key into the
/// notification hubs and a sub-path in the disk layout. The default partition
/// always exists implicitly and is never a mirror target.
///
/// Names are restricted to `[A-Za-z0-9._-]` so they can be used verbatim as a
/// directory component.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Partition(String);

impl Partition {
    /// Reserved name of the implicit default partition.
    pub const DEFAULT_NAME: &'static str = "default";

    /// Create a partition after validating its name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    /// The implicit default partition.
    pub fn default_partition() -> Self {
        Self(Self::DEFAULT_NAME.to_string())
    }

    /// Returns `true` for the implicit default partition.
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_name(name: &str) -> Result<(), TypeError> {
    let reject = |reason: &str| {
        Err(TypeError::InvalidPartition {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return reject("name is empty");
    }
    if name.len() > MAX_PARTITION_NAME_LEN {
        return reject("name is too long");
    }
    if name == "." || name == ".." {
        return reject("name is a relative path component");
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return reject(&format!("character {c:?} is not allowed"));
    }
    Ok(())
}

impl Default for Partition {
    fn default() -> Self {
        Self::default_partition()
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({})", self.0)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Partition {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Partition {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Partition> for String {
    fn from(partition: Partition) -> Self {
        partition.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        for name in ["p1", "mirror-a", "backup_2", "site.eu"] {
            assert_eq!(Partition::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn rejects_path_like_names() {
        for name in ["", ".", "..", "a/b", "a\\b", "has space", "ünïcode"] {
            assert!(
                matches!(Partition::new(name), Err(TypeError::InvalidPartition { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "x".repeat(MAX_PARTITION_NAME_LEN + 1);
        assert!(Partition::new(name).is_err());
        assert!(Partition::new("x".repeat(MAX_PARTITION_NAME_LEN)).is_ok());
    }

    #[test]
    fn default_partition() {
        let p = Partition::default();
        assert!(p.is_default());
        assert_eq!(p.to_string(), "default");
        assert!(!Partition::new("p1").unwrap().is_default());
    }

    #[test]
    fn serde_validates() {
        let p: Partition = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(p.as_str(), "p1");
        assert!(serde_json::from_str::<Partition>("\"../etc\"").is_err());
    }
}
