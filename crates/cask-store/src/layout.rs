//! On-disk layout of committed blobs.
//!
//! ```text
//! <root>/<algo>/<hex[0..2]>/<hex[2..4]>/<algo>-<hex>.dat
//! <root>/partition/<name>/<algo>/<hex[0..2]>/<hex[2..4]>/<algo>-<hex>.dat
//! ```
//!
//! The layout is part of the durable contract: any reader or writer of an
//! existing root must reproduce it exactly.

use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};

use cask_types::{ContentAddress, HashAlgorithm, Partition};

/// Directory holding all mirror partition subtrees.
pub const PARTITION_DIR: &str = "partition";

/// Suffix of committed blob files.
pub const BLOB_SUFFIX: &str = ".dat";

/// Appended to a blob's file name to form its temp file prefix.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Maps content addresses to paths under a storage root.
///
/// Every method is a pure function of its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskLayout {
    root: PathBuf,
}

impl DiskLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name of a committed blob: `<algo>-<hex>.dat`.
    pub fn file_name(address: &ContentAddress) -> String {
        format!("{address}{BLOB_SUFFIX}")
    }

    /// Prefix of temp files for `address`; a random suffix follows it.
    pub fn temp_prefix(address: &ContentAddress) -> String {
        format!("{}{TEMP_SUFFIX}", Self::file_name(address))
    }

    /// Recover the address from a committed blob's file name.
    ///
    /// Temp files and foreign files yield `None`.
    pub fn parse_file_name(name: &str) -> Option<ContentAddress> {
        name.strip_suffix(BLOB_SUFFIX)?.parse().ok()
    }

    /// Shard directory of `address` in the default partition.
    pub fn directory_for(&self, address: &ContentAddress) -> PathBuf {
        shard(&self.root, address)
    }

    /// Canonical path of `address` in the default partition.
    pub fn file_for(&self, address: &ContentAddress) -> PathBuf {
        self.directory_for(address).join(Self::file_name(address))
    }

    /// Root of a partition's subtree. The default partition is the store root.
    pub fn partition_root(&self, partition: &Partition) -> PathBuf {
        if partition.is_default() {
            self.root.clone()
        } else {
            self.root.join(PARTITION_DIR).join(partition.as_str())
        }
    }

    /// Shard directory of `address` inside `partition`.
    pub fn mirror_directory_for(&self, partition: &Partition, address: &ContentAddress) -> PathBuf {
        shard(&self.partition_root(partition), address)
    }

    /// Path of `address` inside `partition`.
    pub fn mirror_file_for(&self, partition: &Partition, address: &ContentAddress) -> PathBuf {
        self.mirror_directory_for(partition, address)
            .join(Self::file_name(address))
    }

    /// Directory holding every blob of one algorithm in the default partition.
    pub fn algorithm_root(&self, algorithm: HashAlgorithm) -> PathBuf {
        self.root.join(algorithm.tag())
    }
}

fn shard(base: &Path, address: &ContentAddress) -> PathBuf {
    let hex = address.to_hex();
    base.join(address.algorithm().tag())
        .join(&hex[0..2])
        .join(&hex[2..4])
}

/// Create `path` and any missing parents, owner-only on Unix.
pub(crate) fn ensure_directory(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
