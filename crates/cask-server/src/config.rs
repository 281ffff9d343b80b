use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use cask_hub::HubConfig;
use cask_store::{MirrorStrategy, StorageConfig};
use cask_types::Partition;

use crate::error::{ServerError, ServerResult};

/// Server configuration, read from TOML. Missing keys take their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub storage_root: PathBuf,
    pub mirror_strategy: MirrorStrategy,
    /// Queue length of every hub subscriber.
    pub hub_capacity: usize,
    /// Largest accepted upload body, in bytes.
    pub max_blob_size: usize,
    /// Partitions every upload is mirrored into, ahead of per-request ones.
    pub default_mirrors: Vec<Partition>,
    /// Program launched with the path of each newly received blob.
    pub viewer_command: Option<String>,
    /// Enables the indexer when present.
    pub index: Option<IndexConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3179)),
            storage_root: PathBuf::from("cask-data"),
            mirror_strategy: MirrorStrategy::default(),
            hub_capacity: HubConfig::default().capacity,
            max_blob_size: 256 * 1024 * 1024,
            default_mirrors: Vec::new(),
            viewer_command: None,
            index: None,
        }
    }
}

/// Where the index lives. No path means an in-memory index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub path: Option<PathBuf>,
}

impl ServerConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to `path`, refusing to overwrite.
    pub fn write_default(path: &Path) -> ServerResult<Self> {
        if path.exists() {
            return Err(ServerError::Config(format!(
                "{} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let config = Self::default();
        let text = toml::to_string_pretty(&config)
            .map_err(|e| ServerError::Config(e.to_string()))?;
        fs::write(path, text)?;
        info!(path = %path.display(), "wrote default configuration");
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.hub_capacity == 0 {
            return Err(ServerError::Config("hub_capacity must be at least 1".into()));
        }
        if self.max_blob_size == 0 {
            return Err(ServerError::Config("max_blob_size must be at least 1".into()));
        }
        if let Some(p) = self.default_mirrors.iter().find(|p| p.is_default()) {
            return Err(ServerError::Config(format!(
                "default_mirrors cannot contain the {p} partition"
            )));
        }
        Ok(())
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            root: self.storage_root.clone(),
            mirror_strategy: self.mirror_strategy,
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            capacity: self.hub_capacity,
        }
    }
}
