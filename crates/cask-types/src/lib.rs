//! Foundation types for cask, a content-addressed blob store.
//!
//! Every other cask crate depends on `cask-types`.
//!
//! # Key Types
//!
//! - [`HashAlgorithm`] -- Digest algorithm tag (`sha1`, `sha256`, `blake3`)
//! - [`ContentAddress`] -- Algorithm + digest identifying a blob by its content
//! - [`SizedContentAddress`] -- A committed blob's address and authoritative size
//! - [`Partition`] -- Named replication target (plus the implicit default)

pub mod address;
pub mod error;
pub mod partition;

pub use address::{ContentAddress, HashAlgorithm, SizedContentAddress};
pub use error::TypeError;
pub use partition::Partition;
