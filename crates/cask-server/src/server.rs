use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use cask_hub::HubRegistry;
use cask_index::{FileIndexStorage, InMemoryIndexStorage, IndexStorage, Indexer};
use cask_store::{BlobStorage, DiskStorage};
use cask_types::Partition;

use crate::config::{IndexConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::hooks::{ReceiveHook, ViewerHook};
use crate::router::{build_router, AppState};

/// Cask blob server.
pub struct CaskServer {
    config: ServerConfig,
    storage: Arc<DiskStorage>,
    hooks: Vec<Arc<dyn ReceiveHook>>,
}

impl CaskServer {
    /// Open the storage described by `config`.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let hubs = Arc::new(HubRegistry::new(config.hub_config())?);
        let storage = Arc::new(DiskStorage::new(config.storage_config(), hubs)?);

        let mut hooks: Vec<Arc<dyn ReceiveHook>> = Vec::new();
        if let Some(command) = &config.viewer_command {
            hooks.push(Arc::new(ViewerHook::new(command.clone())));
        }
        Ok(Self {
            config,
            storage,
            hooks,
        })
    }

    /// Add a hook run after every successful upload.
    pub fn with_hook(mut self, hook: Arc<dyn ReceiveHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<DiskStorage> {
        &self.storage
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            storage: self.storage.clone(),
            hooks: Arc::new(self.hooks.clone()),
            default_mirrors: Arc::new(self.config.default_mirrors.clone()),
        };
        build_router(state, self.config.max_blob_size)
    }

    /// Open the configured index, if any.
    pub fn open_index(&self) -> ServerResult<Option<Arc<dyn IndexStorage>>> {
        let index: Arc<dyn IndexStorage> = match &self.config.index {
            None => return Ok(None),
            Some(IndexConfig { path: None }) => Arc::new(InMemoryIndexStorage::new()),
            Some(IndexConfig { path: Some(path) }) => Arc::new(FileIndexStorage::open(path)?),
        };
        Ok(Some(index))
    }

    /// Subscribe one indexer to the default partition and to every default
    /// mirror partition.
    pub fn start_indexers(&self, index: Arc<dyn IndexStorage>) -> Vec<JoinHandle<u64>> {
        let hubs = self.storage.hubs();
        std::iter::once(Partition::default_partition())
            .chain(self.config.default_mirrors.iter().cloned())
            .map(|partition| Indexer::new(index.clone()).spawn(hubs.hub(&partition).subscribe()))
            .collect()
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        if let Some(index) = self.open_index()? {
            let indexers = self.start_indexers(index);
            info!(indexers = indexers.len(), "indexing enabled");
        }
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            root = %self.config.storage_root.display(),
            "cask server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_crypto::digest;
    use cask_types::HashAlgorithm;

    fn config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            storage_root: root.to_path_buf(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn server_construction() {
        let dir = tempfile::tempdir().unwrap();
        let server = CaskServer::new(config(dir.path())).unwrap();
        assert_eq!(server.config().bind_addr, "127.0.0.1:3179".parse().unwrap());
        assert!(server.open_index().unwrap().is_none());
        let _router = server.router();
    }

    #[test]
    fn invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = ServerConfig {
            hub_capacity: 0,
            ..config(dir.path())
        };
        assert!(matches!(CaskServer::new(bad), Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn indexers_follow_receives() {
        let dir = tempfile::tempdir().unwrap();
        let server = CaskServer::new(ServerConfig {
            index: Some(IndexConfig::default()),
            default_mirrors: vec![Partition::new("backup").unwrap()],
            ..config(dir.path())
        })
        .unwrap();
        let index = server.open_index().unwrap().unwrap();
        let handles = server.start_indexers(index.clone());
        assert_eq!(handles.len(), 2);

        let data = b"index me";
        let addr = digest(HashAlgorithm::Sha1, data);
        let storage = server.storage().clone();
        let mirrors = server.config().default_mirrors.clone();
        let received = tokio::task::spawn_blocking(move || storage.receive(&addr, &data[..], &mirrors))
            .await
            .unwrap()
            .unwrap();

        // Ending the subscriptions lets the indexers drain and stop.
        assert_eq!(server.storage().hubs().close_all(), 2);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
        assert_eq!(
            index.get(&cask_index::have_key(&received.address)).unwrap().as_deref(),
            Some("8")
        );
    }
}
