//! The write-verify-commit pipeline for a single incoming blob.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use cask_crypto::Digester;
use cask_types::{ContentAddress, SizedContentAddress};

use crate::error::{StoreError, StoreResult};
use crate::layout::{ensure_directory, DiskLayout};

/// Progress of a receive call.
///
/// The stages run in declaration order. A failure in any stage ends the call;
/// the error records the stage it happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReceiveStage {
    Start,
    DirectoryReady,
    TempFileOpen,
    Streaming,
    Verifying,
    Committing,
    Committed,
    Mirrored,
    Notified,
}

impl fmt::Display for ReceiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::DirectoryReady => "directory ready",
            Self::TempFileOpen => "temp file open",
            Self::Streaming => "streaming",
            Self::Verifying => "verifying",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Mirrored => "mirrored",
            Self::Notified => "notified",
        };
        f.write_str(name)
    }
}

/// A blob that has been renamed into its canonical position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedBlob {
    /// Address plus the size observed on disk after the rename.
    pub blob: SizedContentAddress,
    /// Canonical path of the committed file.
    pub path: PathBuf,
}

/// Writes to the temp file and the digester together.
///
/// Only bytes the file accepted are hashed, so the digest always describes
/// exactly what is on disk.
struct Tee<'a> {
    file: &'a mut fs::File,
    digester: &'a mut Digester,
}

impl Write for Tee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.digester.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Receive `source` as the blob `claimed` and commit it under `layout`.
///
/// On any error before the rename the temp file is removed (it is dropped
/// with the scope that owns it) and the canonical path is untouched. After
/// the rename the committed file is never rolled back.
pub fn commit_blob(
    layout: &DiskLayout,
    claimed: &ContentAddress,
    source: &mut dyn Read,
) -> StoreResult<CommittedBlob> {
    let result = write_verify_commit(layout, claimed, source);
    if let Err(e) = &result {
        warn!(address = %claimed, error = %e, "receive failed");
    }
    result
}

fn write_verify_commit(
    layout: &DiskLayout,
    claimed: &ContentAddress,
    source: &mut dyn Read,
) -> StoreResult<CommittedBlob> {
    trace!(address = %claimed, stage = %ReceiveStage::Start);
    let directory = layout.directory_for(claimed);
    ensure_directory(&directory).map_err(|source| StoreError::StorageUnavailable {
        path: directory.clone(),
        source,
    })?;

    trace!(address = %claimed, stage = %ReceiveStage::DirectoryReady);
    // Same directory as the final path, so the commit is a same-filesystem rename.
    let mut temp = tempfile::Builder::new()
        .prefix(&DiskLayout::temp_prefix(claimed))
        .tempfile_in(&directory)
        .map_err(|source| StoreError::StorageUnavailable {
            path: directory.clone(),
            source,
        })?;

    trace!(address = %claimed, stage = %ReceiveStage::TempFileOpen, temp = %temp.path().display());
    let mut digester = Digester::for_address(claimed);
    let written = {
        let mut tee = Tee {
            file: temp.as_file_mut(),
            digester: &mut digester,
        };
        io::copy(source, &mut tee).map_err(|e| io_error(ReceiveStage::Streaming, e))?
    };
    temp.as_file_mut()
        .flush()
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| io_error(ReceiveStage::Streaming, e))?;
    // Closes the file; the path is still removed on drop. std reports no
    // error from close, so sync_all above is the last checked write.
    let temp_path = temp.into_temp_path();

    trace!(address = %claimed, stage = %ReceiveStage::Verifying, bytes = written);
    if !digester.matches(claimed) {
        return Err(StoreError::CorruptBlob {
            claimed: claimed.clone(),
            computed: digester.finish(),
        });
    }

    // Commit point. An existing file holds identical content and is replaced.
    trace!(address = %claimed, stage = %ReceiveStage::Committing);
    let canonical = layout.file_for(claimed);
    temp_path
        .persist(&canonical)
        .map_err(|e| io_error(ReceiveStage::Committing, e.error))?;

    trace!(address = %claimed, stage = %ReceiveStage::Committed);
    let size = verify_committed(&canonical, claimed, written)?;
    debug!(address = %claimed, size, path = %canonical.display(), "blob committed");

    Ok(CommittedBlob {
        blob: SizedContentAddress::new(claimed.clone(), size),
        path: canonical,
    })
}

/// Check that the committed path is a regular file of the written size.
///
/// Returns the size observed on disk.
pub(crate) fn verify_committed(
    path: &Path,
    address: &ContentAddress,
    written: u64,
) -> StoreResult<u64> {
    let fail = |reason: String| StoreError::VerificationFailed {
        address: address.clone(),
        reason,
    };
    let meta = fs::symlink_metadata(path)
        .map_err(|e| fail(format!("cannot stat committed file: {e}")))?;
    if !meta.file_type().is_file() {
        return Err(fail("committed path is not a regular file".into()));
    }
    if meta.len() != written {
        return Err(fail(format!(
            "{} bytes on disk, {written} bytes written",
            meta.len()
        )));
    }
    Ok(meta.len())
}

fn io_error(stage: ReceiveStage, source: io::Error) -> StoreError {
    StoreError::Io { stage, source }
}
