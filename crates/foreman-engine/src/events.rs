//! Change-event fan-out.
//!
//! A bounded broadcast channel: publishing never blocks a mutator, and a
//! subscriber that falls behind loses the oldest events rather than
//! applying backpressure to the write path.

use tokio::sync::broadcast;
use tracing::debug;

use foreman_core::ChangeEvent;

/// Fan-out of [`ChangeEvent`]s to external subscribers.
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Failures (no live subscribers) are recorded and
    /// never fail the initiating mutation.
    pub fn publish(&self, event: ChangeEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!(event = %err.0.kind, "no event subscribers");
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
