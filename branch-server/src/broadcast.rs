//! Event broadcaster - 分支事件广播
//!
//! One `tokio::sync::broadcast` channel per branch. Engines publish only
//! after their transaction commits; the broadcaster never touches engine
//! state. Delivery is at-most-once and best-effort - a lagged or absent
//! subscriber loses events, never consistency, because everything the
//! events describe stays independently queryable.
//!
//! ```text
//! StockEngine / OrderEngine / TableEngine
//!        │ (after commit)
//!        ▼
//! EventPublisher::publish(event)
//!        │
//!   EventBroadcaster ── DashMap<branch_id, broadcast::Sender>
//!        │
//!        ├── subscribe("branch-1") ──► boundary adapter
//!        └── subscribe("branch-2") ──► boundary adapter
//! ```

use dashmap::DashMap;
use shared::event::BranchEvent;
use tokio::sync::broadcast;

/// Default per-branch channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Publisher capability injected into the engines.
///
/// Engines depend on this trait rather than on a concrete broadcaster so
/// tests can capture events and embedders can bridge to their own
/// transport.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: BranchEvent);
}

/// Publisher that drops everything (tests, headless embedding)
#[derive(Debug, Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: BranchEvent) {}
}

/// Fan-out of committed state changes, one channel per branch
#[derive(Debug)]
pub struct EventBroadcaster {
    channels: DashMap<String, broadcast::Sender<BranchEvent>>,
    capacity: usize,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to one branch's event stream
    pub fn subscribe(&self, branch_id: &str) -> broadcast::Receiver<BranchEvent> {
        self.sender_for(branch_id).subscribe()
    }

    /// Number of live subscribers on a branch channel
    pub fn subscriber_count(&self, branch_id: &str) -> usize {
        self.channels
            .get(branch_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn sender_for(&self, branch_id: &str) -> broadcast::Sender<BranchEvent> {
        self.channels
            .entry(branch_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBroadcaster {
    fn publish(&self, event: BranchEvent) {
        let sender = self.sender_for(&event.branch_id);
        match sender.send(event) {
            Ok(receivers) => {
                tracing::trace!(receivers, "Event published");
            }
            Err(broadcast::error::SendError(event)) => {
                // 无订阅者时丢弃（best-effort）
                tracing::debug!(
                    branch_id = %event.branch_id,
                    event_type = %event.event_type(),
                    "No subscribers on branch channel, event dropped"
                );
            }
        }
    }
}

/// Publish a batch collected during a transaction, in commit order
pub fn publish_all(publisher: &dyn EventPublisher, events: Vec<BranchEvent>) {
    for event in events {
        publisher.publish(event);
    }
}
