//! HTTP server for cask.
//!
//! Thin glue over [`cask_store::DiskStorage`]: uploads go through the receive
//! pipeline on the blocking pool, downloads and listings read committed
//! blobs, and optional receive hooks and indexers follow every upload.

pub mod config;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod router;
pub mod server;

pub use config::{IndexConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::{BlobResponse, ListResponse};
pub use hooks::{NoOpHook, ReceiveHook, ViewerHook};
pub use router::AppState;
pub use server::CaskServer;
