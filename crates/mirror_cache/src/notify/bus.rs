//! Per-collection change bus.
//!
//! Each store owns one bus; there is no process-wide registry. Subscribing
//! hands out a broadcast receiver and dropping that receiver is the
//! unsubscribe.

use tokio::sync::broadcast;

use mirror_cache_core::events::ChangeEvent;

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Publish/subscribe channel for one collection's change events.
#[derive(Debug, Clone)]
pub struct ChangeBus<R> {
    sender: broadcast::Sender<ChangeEvent<R>>,
}

impl<R: Clone> ChangeBus<R> {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to every current subscriber.
    ///
    /// Returns the number of subscribers that will see it. Publishing with
    /// no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent<R>) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<R>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<R: Clone> Default for ChangeBus<R> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
