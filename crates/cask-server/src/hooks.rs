use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use cask_types::SizedContentAddress;

use crate::error::ServerResult;

/// Runs after a blob has been received, mirrored and announced.
///
/// Hooks are best effort: a failing hook is logged and never fails the
/// upload that triggered it.
#[async_trait]
pub trait ReceiveHook: Send + Sync {
    async fn post_receive(&self, blob: &SizedContentAddress, path: &Path) -> ServerResult<()>;
}

pub struct NoOpHook;

#[async_trait]
impl ReceiveHook for NoOpHook {
    async fn post_receive(&self, _blob: &SizedContentAddress, _path: &Path) -> ServerResult<()> {
        Ok(())
    }
}

/// Opens each received blob in an external viewer program.
pub struct ViewerHook {
    command: String,
}

impl ViewerHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl ReceiveHook for ViewerHook {
    async fn post_receive(&self, blob: &SizedContentAddress, path: &Path) -> ServerResult<()> {
        let mut child = Command::new(&self.command).arg(path).spawn()?;
        debug!(command = %self.command, address = %blob.address, "viewer launched");
        // Reap the child without holding up the upload.
        let command = self.command.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(command = %command, %status, "viewer exited unsuccessfully")
                }
                Ok(_) => {}
                Err(e) => warn!(command = %command, error = %e, "waiting for viewer failed"),
            }
        });
        Ok(())
    }
}
