use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use cask_types::{Partition, SizedContentAddress};

use crate::error::{HubError, Result};
use crate::event::BlobReceived;

/// Identifies one subscriber of one hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Outcome of a single publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers whose queue was full; the event was dropped for them.
    pub dropped: usize,
}

/// Internal subscriber: an id paired with the sending half of its queue.
struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::Sender<BlobReceived>,
}

struct HubState {
    subscribers: Vec<Subscriber>,
    sequence: u64,
    dropped_total: u64,
}

/// Publish/subscribe hub for one partition.
///
/// Each subscriber owns a bounded queue. Publishing uses `try_send`, so a slow
/// or stalled subscriber never delays the publisher or any other subscriber:
/// when its queue is full the new event is dropped for that subscriber alone.
/// Publishing happens under the subscriber lock, which gives every subscriber
/// the events of this partition in publish order.
pub struct BlobHub {
    partition: Partition,
    capacity: usize,
    next_id: AtomicU64,
    state: Mutex<HubState>,
}

impl BlobHub {
    /// Create a hub whose subscribers buffer up to `capacity` events each.
    pub fn new(partition: Partition, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HubError::InvalidCapacity(capacity));
        }
        Ok(Self::with_valid_capacity(partition, capacity))
    }

    pub(crate) fn with_valid_capacity(partition: Partition, capacity: usize) -> Self {
        Self {
            partition,
            capacity,
            next_id: AtomicU64::new(1),
            state: Mutex::new(HubState {
                subscribers: Vec::new(),
                sequence: 0,
                dropped_total: 0,
            }),
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.state
            .lock()
            .expect("hub lock poisoned")
            .subscribers
            .push(Subscriber { id, sender });
        debug!(partition = %self.partition, subscription = %id, "subscribed");
        Subscription {
            id,
            partition: self.partition.clone(),
            receiver,
        }
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    ///
    /// Events queued before this call stay readable from the subscription;
    /// nothing published afterwards reaches it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock().expect("hub lock poisoned");
        let before = state.subscribers.len();
        state.subscribers.retain(|sub| sub.id != id);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!(partition = %self.partition, subscription = %id, "unsubscribed");
        }
        removed
    }

    /// Remove every subscriber. Returns how many were removed.
    ///
    /// Their subscriptions still yield already queued events, then end.
    pub fn unsubscribe_all(&self) -> usize {
        let removed = std::mem::take(&mut self.state.lock().expect("hub lock poisoned").subscribers);
        if !removed.is_empty() {
            debug!(partition = %self.partition, removed = removed.len(), "all subscribers removed");
        }
        removed.len()
    }

    /// Announce that `blob` is now present in this partition.
    ///
    /// Having no subscribers is the normal case and not an error. Subscribers
    /// whose subscription was dropped are pruned.
    pub fn notify_blob_received(&self, blob: &SizedContentAddress) -> Delivery {
        let mut state = self.state.lock().expect("hub lock poisoned");
        state.sequence += 1;
        let event = BlobReceived {
            partition: self.partition.clone(),
            blob: blob.clone(),
            sequence: state.sequence,
        };

        let mut delivery = Delivery::default();
        state.subscribers.retain(|sub| match sub.sender.try_send(event.clone()) {
            Ok(()) => {
                delivery.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                delivery.dropped += 1;
                warn!(
                    partition = %self.partition,
                    subscription = %sub.id,
                    address = %blob.address,
                    "subscriber queue full, event dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(partition = %self.partition, subscription = %sub.id, "pruning closed subscriber");
                false
            }
        });
        state.dropped_total += delivery.dropped as u64;

        debug!(
            partition = %self.partition,
            address = %blob.address,
            sequence = event.sequence,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "blob received notification"
        );
        delivery
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .expect("hub lock poisoned")
            .subscribers
            .len()
    }

    /// Events dropped over the hub's lifetime because a queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.state.lock().expect("hub lock poisoned").dropped_total
    }
}

impl fmt::Debug for BlobHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHub")
            .field("partition", &self.partition)
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving side of a hub subscription.
///
/// Dropping the subscription has the same effect as unsubscribing: the hub
/// prunes it on the next publish.
pub struct Subscription {
    id: SubscriptionId,
    partition: Partition,
    receiver: mpsc::Receiver<BlobReceived>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Wait for the next event. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<BlobReceived> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<BlobReceived> {
        self.receiver.try_recv().ok()
    }

    /// Drain every event queued right now.
    pub fn drain(&mut self) -> Vec<BlobReceived> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("partition", &self.partition)
            .finish()
    }
}
