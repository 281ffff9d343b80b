//! Content digests for cask.
//!
//! Wraps established hash implementations (`sha1`, `sha2`, `blake3`) behind a
//! single streaming [`Digester`] that produces [`cask_types::ContentAddress`]
//! values. No custom cryptography.

pub mod digester;

pub use digester::{digest, digest_reader, Digester};
