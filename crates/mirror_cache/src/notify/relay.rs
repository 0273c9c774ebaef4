//! Forwarding of one collection's events onto another bus.
//!
//! Decorators re-publish the events of the collection they wrap so that
//! their subscribers see the wrapped collection's changes. A relay follows
//! exactly one upstream at a time: attaching a new upstream stops the old
//! forwarding task first.

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use mirror_cache_core::events::ChangeEvent;

use super::ChangeBus;

/// Forwards events from an upstream receiver onto a target bus.
#[derive(Debug)]
pub struct EventRelay<R> {
    target: ChangeBus<R>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R> EventRelay<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Creates a relay that is not yet forwarding anything.
    pub fn new(target: ChangeBus<R>) -> Self {
        Self {
            target,
            task: Mutex::new(None),
        }
    }

    /// Creates a relay already forwarding `upstream`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attached(target: ChangeBus<R>, upstream: broadcast::Receiver<ChangeEvent<R>>) -> Self {
        let task = tokio::spawn(forward(upstream, target.clone()));
        Self {
            target,
            task: Mutex::new(Some(task)),
        }
    }

    /// Re-points the relay at `upstream`, stopping the previous forwarding.
    pub async fn attach(&self, upstream: broadcast::Receiver<ChangeEvent<R>>) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(forward(upstream, self.target.clone())));
    }

    /// Stops forwarding.
    pub async fn detach(&self) {
        if let Some(previous) = self.task.lock().await.take() {
            previous.abort();
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl<R> Drop for EventRelay<R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn forward<R>(upstream: broadcast::Receiver<ChangeEvent<R>>, target: ChangeBus<R>)
where
    R: Clone + Send + Sync + 'static,
{
    let mut events = BroadcastStream::new(upstream);
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                tracing::trace!(event = event.name(), "Relaying change event");
                target.publish(event);
            }
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                // Lost events can only be recovered by a full re-read downstream
                tracing::warn!(missed, "Relay lagged behind upstream, publishing reset");
                target.publish(ChangeEvent::reset());
            }
        }
    }
}
