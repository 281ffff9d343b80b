//! Blob notification hubs for cask.
//!
//! Decouples blob producers (the receive pipeline) from consumers (indexers,
//! replicators) with one publish/subscribe hub per partition. Hubs are
//! created lazily through a [`HubRegistry`] that the server owns for its whole
//! lifetime and hands to the storage layer explicitly.
//!
//! Delivery never blocks the publisher: every subscriber has a bounded queue,
//! and an event that does not fit is dropped for that subscriber only.

pub mod error;
pub mod event;
pub mod hub;
pub mod registry;

pub use error::{HubError, Result};
pub use event::BlobReceived;
pub use hub::{BlobHub, Delivery, Subscription, SubscriptionId};
pub use registry::{HubConfig, HubRegistry};
