//! Replication of committed blobs into mirror partitions.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cask_crypto::Digester;
use cask_types::{Partition, SizedContentAddress};

use crate::error::{StoreError, StoreResult};
use crate::layout::{ensure_directory, DiskLayout};

/// How a committed blob is placed into a mirror partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorStrategy {
    /// Hard-link the canonical file. Requires one filesystem; copies nothing.
    #[default]
    HardLink,
    /// Copy into a temp file, sync, verify the size, then rename into place.
    /// For partitions on another volume.
    Copy,
}

/// What happened for one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorOutcome {
    Linked,
    Copied,
    /// A matching file was already there (e.g. a retried receive).
    AlreadyPresent,
}

/// Places committed blobs into mirror partitions.
#[derive(Clone, Copy, Debug)]
pub struct PartitionMirror<'a> {
    layout: &'a DiskLayout,
    strategy: MirrorStrategy,
}

impl<'a> PartitionMirror<'a> {
    pub fn new(layout: &'a DiskLayout, strategy: MirrorStrategy) -> Self {
        Self { layout, strategy }
    }

    /// Mirror `blob` (committed at `committed`) into each partition in order.
    ///
    /// Stops at the first failure. Partitions mirrored before the failure
    /// stay mirrored; the rest are not attempted.
    pub fn mirror_all(
        &self,
        committed: &Path,
        blob: &SizedContentAddress,
        partitions: &[Partition],
    ) -> StoreResult<Vec<MirrorOutcome>> {
        partitions
            .iter()
            .map(|partition| self.mirror_one(committed, blob, partition))
            .collect()
    }

    /// Mirror `blob` into a single partition.
    pub fn mirror_one(
        &self,
        committed: &Path,
        blob: &SizedContentAddress,
        partition: &Partition,
    ) -> StoreResult<MirrorOutcome> {
        let failed = |source: io::Error| StoreError::MirrorFailed {
            partition: partition.clone(),
            source,
        };

        let directory = self.layout.mirror_directory_for(partition, &blob.address);
        ensure_directory(&directory).map_err(failed)?;
        let target = self.layout.mirror_file_for(partition, &blob.address);

        let outcome = match self.strategy {
            MirrorStrategy::HardLink => match fs::hard_link(committed, &target) {
                Ok(()) => MirrorOutcome::Linked,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    check_existing(committed, &target, blob).map_err(failed)?
                }
                Err(e) => return Err(failed(e)),
            },
            MirrorStrategy::Copy => {
                if target.exists() {
                    check_existing(committed, &target, blob).map_err(failed)?
                } else {
                    copy_verified(committed, &directory, &target, blob).map_err(failed)?;
                    MirrorOutcome::Copied
                }
            }
        };

        match outcome {
            MirrorOutcome::AlreadyPresent => {
                debug!(partition = %partition, address = %blob.address, "mirror already present")
            }
            _ => info!(partition = %partition, address = %blob.address, ?outcome, "mirrored"),
        }
        Ok(outcome)
    }
}

/// Accept an existing mirror file only if it holds the blob's content.
///
/// A link to the committed file is accepted as is; anything else of the
/// right size is re-hashed against the blob's address.
fn check_existing(
    committed: &Path,
    target: &Path,
    blob: &SizedContentAddress,
) -> io::Result<MirrorOutcome> {
    let meta = fs::symlink_metadata(target)?;
    if meta.file_type().is_file()
        && meta.len() == blob.size
        && (same_file(committed, &meta)? || content_matches(target, blob)?)
    {
        return Ok(MirrorOutcome::AlreadyPresent);
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "existing mirror file {} does not match the committed blob",
            target.display()
        ),
    ))
}

#[cfg(unix)]
fn same_file(committed: &Path, target: &fs::Metadata) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let committed = fs::metadata(committed)?;
    Ok(committed.dev() == target.dev() && committed.ino() == target.ino())
}

#[cfg(not(unix))]
fn same_file(_committed: &Path, _target: &fs::Metadata) -> io::Result<bool> {
    Ok(false)
}

fn content_matches(target: &Path, blob: &SizedContentAddress) -> io::Result<bool> {
    let mut digester = Digester::for_address(&blob.address);
    io::copy(&mut File::open(target)?, &mut digester)?;
    debug!(path = %target.display(), address = %blob.address, "re-hashed existing mirror file");
    Ok(digester.matches(&blob.address))
}

fn copy_verified(
    committed: &Path,
    directory: &Path,
    target: &Path,
    blob: &SizedContentAddress,
) -> io::Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(&DiskLayout::temp_prefix(&blob.address))
        .tempfile_in(directory)?;
    let copied = io::copy(&mut File::open(committed)?, temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    if copied != blob.size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("copied {copied} bytes, expected {}", blob.size),
        ));
    }
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receive::commit_blob;
    use cask_crypto::digest;
    use cask_types::HashAlgorithm;

    fn committed(layout: &DiskLayout, data: &[u8]) -> crate::receive::CommittedBlob {
        let claimed = digest(HashAlgorithm::Sha1, data);
        commit_blob(layout, &claimed, &mut &data[..]).unwrap()
    }

    fn p(name: &str) -> Partition {
        Partition::new(name).unwrap()
    }

    #[cfg(unix)]
    fn same_inode(a: &Path, b: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;
        let (ma, mb) = (fs::metadata(a).unwrap(), fs::metadata(b).unwrap());
        ma.ino() == mb.ino() && ma.dev() == mb.dev()
    }

    #[test]
    fn hard_links_into_each_partition() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"mirror me");
        let mirror = PartitionMirror::new(&layout, MirrorStrategy::HardLink);

        let outcomes = mirror
            .mirror_all(&c.path, &c.blob, &[p("p1"), p("p2")])
            .unwrap();
        assert_eq!(outcomes, vec![MirrorOutcome::Linked, MirrorOutcome::Linked]);
        for name in ["p1", "p2"] {
            let target = layout.mirror_file_for(&p(name), &c.blob.address);
            assert_eq!(fs::read(&target).unwrap(), b"mirror me");
            #[cfg(unix)]
            assert!(same_inode(&c.path, &target));
        }
    }

    #[test]
    fn existing_link_is_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"again");
        let mirror = PartitionMirror::new(&layout, MirrorStrategy::HardLink);

        assert_eq!(
            mirror.mirror_one(&c.path, &c.blob, &p("p1")).unwrap(),
            MirrorOutcome::Linked
        );
        assert_eq!(
            mirror.mirror_one(&c.path, &c.blob, &p("p1")).unwrap(),
            MirrorOutcome::AlreadyPresent
        );
    }

    #[test]
    fn mismatched_existing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"the real bytes");
        let target = layout.mirror_file_for(&p("p1"), &c.blob.address);
        ensure_directory(target.parent().unwrap()).unwrap();
        fs::write(&target, b"short").unwrap();

        let mirror = PartitionMirror::new(&layout, MirrorStrategy::HardLink);
        let err = mirror.mirror_one(&c.path, &c.blob, &p("p1")).unwrap_err();
        assert!(matches!(err, StoreError::MirrorFailed { ref partition, .. } if partition.as_str() == "p1"));
    }

    #[test]
    fn same_size_different_bytes_fails_for_both_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"genuine content!");

        for strategy in [MirrorStrategy::HardLink, MirrorStrategy::Copy] {
            let target = layout.mirror_file_for(&p("p1"), &c.blob.address);
            ensure_directory(target.parent().unwrap()).unwrap();
            fs::write(&target, b"XXXXXXXXXXXXXXXX").unwrap();

            let err = PartitionMirror::new(&layout, strategy)
                .mirror_one(&c.path, &c.blob, &p("p1"))
                .unwrap_err();
            assert!(
                matches!(err, StoreError::MirrorFailed { ref partition, .. } if partition.as_str() == "p1"),
                "{strategy:?}: {err:?}"
            );
            assert_eq!(fs::read(&target).unwrap(), b"XXXXXXXXXXXXXXXX");
            fs::remove_file(&target).unwrap();
        }
    }

    #[test]
    fn existing_identical_copy_is_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"same bytes, other inode");
        let target = layout.mirror_file_for(&p("p1"), &c.blob.address);
        ensure_directory(target.parent().unwrap()).unwrap();
        fs::write(&target, b"same bytes, other inode").unwrap();

        let mirror = PartitionMirror::new(&layout, MirrorStrategy::HardLink);
        assert_eq!(
            mirror.mirror_one(&c.path, &c.blob, &p("p1")).unwrap(),
            MirrorOutcome::AlreadyPresent
        );
    }

    #[test]
    fn stops_at_first_failure_and_keeps_earlier_mirrors() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"partial mirror");

        // A plain file where p2's subtree should be makes its mkdir fail.
        ensure_directory(&dir.path().join("partition")).unwrap();
        fs::write(layout.partition_root(&p("p2")), b"blocker").unwrap();

        let mirror = PartitionMirror::new(&layout, MirrorStrategy::HardLink);
        let err = mirror
            .mirror_all(&c.path, &c.blob, &[p("p1"), p("p2"), p("p3")])
            .unwrap_err();
        assert!(matches!(err, StoreError::MirrorFailed { ref partition, .. } if partition.as_str() == "p2"));
        assert!(layout.mirror_file_for(&p("p1"), &c.blob.address).exists());
        assert!(!layout.partition_root(&p("p3")).exists());
    }

    #[test]
    fn copy_strategy_makes_independent_copy() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DiskLayout::new(dir.path());
        let c = committed(&layout, b"copied bytes");
        let mirror = PartitionMirror::new(&layout, MirrorStrategy::Copy);

        assert_eq!(
            mirror.mirror_one(&c.path, &c.blob, &p("offsite")).unwrap(),
            MirrorOutcome::Copied
        );
        let target = layout.mirror_file_for(&p("offsite"), &c.blob.address);
        assert_eq!(fs::read(&target).unwrap(), b"copied bytes");
        #[cfg(unix)]
        assert!(!same_inode(&c.path, &target));

        assert_eq!(
            mirror.mirror_one(&c.path, &c.blob, &p("offsite")).unwrap(),
            MirrorOutcome::AlreadyPresent
        );
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }
}
