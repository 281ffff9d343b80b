//! Key-value indexing for cask.
//!
//! Index backends implement [`IndexStorage`], a small contract of single
//! mutations plus all-or-nothing batches that any store can provide. The
//! [`Indexer`] listens on a partition hub and records every received blob
//! with one batch per event.
//!
//! # Key Types
//!
//! - [`IndexStorage`] -- The backend contract
//! - [`BatchMutation`] -- Staged mutations, applied together on commit
//! - [`InMemoryIndexStorage`] -- `BTreeMap` backend for tests and ephemeral use
//! - [`FileIndexStorage`] -- JSON snapshot backend with atomic rewrites
//! - [`Indexer`] -- Hub consumer that feeds an index

pub mod error;
pub mod file;
pub mod indexer;
pub mod memory;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use file::FileIndexStorage;
pub use indexer::{have_key, received_key, Indexer};
pub use memory::InMemoryIndexStorage;
pub use traits::{BatchMutation, IndexStorage, Mutation};
