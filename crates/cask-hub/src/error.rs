/// Errors produced by the notification hubs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HubError {
    /// Subscriber queues must hold at least one event.
    #[error("invalid subscriber queue capacity: {0}")]
    InvalidCapacity(usize),
}

/// Convenience alias used throughout the hub crate.
pub type Result<T> = std::result::Result<T, HubError>;
