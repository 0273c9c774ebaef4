//! Pass-through collection decorator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use mirror_cache_core::events::ChangeEvent;
use mirror_cache_core::storage::{Collection, Query, Record, Result, Sink};

use crate::notify::{ChangeBus, EventRelay};

/// Decorator forwarding every operation unmodified to a delegate.
///
/// The proxy re-publishes the delegate's change events on its own bus. The
/// delegate can be replaced at runtime: forwarding of events moves to the
/// new delegate (never both) and subscribers receive a `Reset`, since the
/// visible contents changed wholesale.
pub struct ProxyCollection<R: Record> {
    delegate: RwLock<Arc<dyn Collection<R>>>,
    bus: ChangeBus<R>,
    relay: EventRelay<R>,
}

impl<R: Record> ProxyCollection<R> {
    /// Creates a proxy over `delegate`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(delegate: Arc<dyn Collection<R>>) -> Self {
        let bus = ChangeBus::default();
        let relay = EventRelay::attached(bus.clone(), delegate.subscribe());
        Self {
            delegate: RwLock::new(delegate),
            bus,
            relay,
        }
    }

    /// Returns the current delegate.
    pub async fn delegate(&self) -> Arc<dyn Collection<R>> {
        Arc::clone(&*self.delegate.read().await)
    }

    /// Replaces the delegate.
    ///
    /// Operations issued after this returns reach the new delegate, and only
    /// the new delegate's events are forwarded.
    pub async fn set_delegate(&self, delegate: Arc<dyn Collection<R>>) {
        {
            let mut current = self.delegate.write().await;
            self.relay.attach(delegate.subscribe()).await;
            *current = delegate;
        }

        self.bus.publish(ChangeEvent::reset());
        tracing::debug!("Proxy delegate replaced");
    }
}

#[async_trait]
impl<R: Record> Collection<R> for ProxyCollection<R> {
    async fn find(&self, key: &R::Key) -> Result<Option<R>> {
        self.delegate().await.find(key).await
    }

    async fn select(&self, sink: &mut dyn Sink<R>, query: &Query<R>) -> Result<usize> {
        self.delegate().await.select(sink, query).await
    }

    async fn put(&self, record: R) -> Result<R> {
        self.delegate().await.put(record).await
    }

    async fn remove(&self, record: &R) -> Result<()> {
        self.delegate().await.remove(record).await
    }

    async fn remove_all(&self, query: &Query<R>) -> Result<usize> {
        self.delegate().await.remove_all(query).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<R>> {
        self.bus.subscribe()
    }
}
