//! Caching collection decorator.
//!
//! Serves reads from a complete local mirror of a source collection and
//! writes through to the source first, then to the mirror.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use mirror_cache_core::events::ChangeEvent;
use mirror_cache_core::storage::{Collection, Query, Record, Result, Sink, StoreError};

use crate::config::Config;
use crate::gate::{Gate, GateStatus};
use crate::notify::{ChangeBus, EventRelay};

use super::sync::{fill_gate, follow_gates, listen};

/// Collection decorator that mirrors a source into a fast cache collection.
///
/// - `find` and `select` are answered by the mirror once the cache fill has
///   completed. Calls made earlier wait for it.
/// - `put`, `remove` and `remove_all` hit the source first and are then
///   applied to the mirror. A source failure leaves the mirror untouched; a
///   mirror failure after a successful source write is reported as
///   [`StoreError::MirrorDesync`].
/// - Changes made to the source by other clients are picked up through its
///   change notifications. A source `Reset` refills the mirror.
///
/// The mirror must not be written by anyone else.
pub struct CachingCollection<R: Record> {
    shared: Arc<Shared<R>>,
}

/// State shared between the decorator and its source listener.
pub(super) struct Shared<R: Record> {
    cache: Arc<dyn Collection<R>>,
    binding: RwLock<Binding<R>>,
    /// Admits one write-through at a time, in arrival order.
    writes: Mutex<()>,
    bus: ChangeBus<R>,
    _relay: EventRelay<R>,
    config: Config,
}

/// The current source together with its listener and cache fill.
struct Binding<R: Record> {
    source: Arc<dyn Collection<R>>,
    gate: Arc<Gate<dyn Collection<R>>>,
    listener: JoinHandle<()>,
    generation: u64,
}

impl<R: Record> Binding<R> {
    /// Subscribes to `source` and starts filling `cache` from it.
    ///
    /// The listener does not process events until the returned sender fires.
    fn attach(
        shared: Weak<Shared<R>>,
        source: Arc<dyn Collection<R>>,
        cache: &Arc<dyn Collection<R>>,
        config: &Config,
        generation: u64,
    ) -> (Self, oneshot::Sender<()>) {
        let (arm, armed) = oneshot::channel();

        // 1. Subscribe before the fill takes its snapshot
        let events = source.subscribe();
        let listener = tokio::spawn(listen(shared, events, armed, generation));

        // 2. Fill behind a new gate
        let gate = fill_gate(Arc::clone(&source), Arc::clone(cache), config.fill_timeout());

        let binding = Self {
            source,
            gate,
            listener,
            generation,
        };
        (binding, arm)
    }
}

impl<R: Record> Drop for Binding<R> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl<R: Record> CachingCollection<R> {
    /// Creates a decorator with configuration from the environment.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(source: Arc<dyn Collection<R>>, cache: Arc<dyn Collection<R>>) -> Self {
        Self::with_config(source, cache, Config::default())
    }

    /// Creates a decorator and starts the initial cache fill.
    ///
    /// # Arguments
    ///
    /// * `source` - The authoritative collection
    /// * `cache` - The collection to mirror into; its contents are replaced
    /// * `config` - Fill timeout and bus capacity
    pub fn with_config(
        source: Arc<dyn Collection<R>>,
        cache: Arc<dyn Collection<R>>,
        config: Config,
    ) -> Self {
        let bus = ChangeBus::new(config.change_bus_capacity);
        let relay = EventRelay::attached(bus.clone(), cache.subscribe());

        let mut arm = None;
        let shared = Arc::new_cyclic(|weak| {
            let (binding, armed) = Binding::attach(weak.clone(), source, &cache, &config, 0);
            arm = Some(armed);
            Shared {
                cache,
                binding: RwLock::new(binding),
                writes: Mutex::new(()),
                bus,
                _relay: relay,
                config,
            }
        });
        if let Some(arm) = arm {
            let _ = arm.send(());
        }

        Self { shared }
    }

    /// Returns the current source.
    pub async fn source(&self) -> Arc<dyn Collection<R>> {
        self.shared.source().await
    }

    /// Returns the mirror collection.
    pub fn cache(&self) -> Arc<dyn Collection<R>> {
        Arc::clone(&self.shared.cache)
    }

    /// Replaces the source and refills the mirror from it.
    ///
    /// The previous source's listener is stopped before the new one is
    /// subscribed, and both happen under the binding lock, so exactly one
    /// source is ever being listened to. Calls waiting on the previous fill
    /// move over to the new one.
    pub async fn set_source(&self, source: Arc<dyn Collection<R>>) {
        let _turn = self.shared.writes.lock().await;
        let mut binding = self.shared.binding.write().await;

        // 1. Detach from the previous source
        binding.listener.abort();
        binding.gate.close().await;

        // 2. Subscribe to the new source and fill from it
        let generation = binding.generation + 1;
        let (next, arm) = Binding::attach(
            Arc::downgrade(&self.shared),
            source,
            &self.shared.cache,
            &self.shared.config,
            generation,
        );
        *binding = next;
        let _ = arm.send(());

        tracing::info!(generation, "Cache source replaced");
    }

    /// Re-runs the cache fill, keeping the current source subscription.
    ///
    /// Recovers a mirror after [`StoreError::MirrorDesync`] or a failed fill.
    pub async fn refresh(&self) {
        self.shared.refill("refresh requested", None).await;
    }

    /// Waits for the current cache fill.
    pub async fn ready(&self) -> Result<()> {
        self.shared.mirror().await.map(|_| ())
    }

    pub async fn status(&self) -> GateStatus {
        self.shared.gate().await.status().await
    }
}

impl<R: Record> Shared<R> {
    async fn source(&self) -> Arc<dyn Collection<R>> {
        Arc::clone(&self.binding.read().await.source)
    }

    pub(super) async fn gate(&self) -> Arc<Gate<dyn Collection<R>>> {
        Arc::clone(&self.binding.read().await.gate)
    }

    /// Runs `op` against the mirror through the current gate.
    ///
    /// A gate closed by a refill while the call waited is followed to its
    /// replacement, so callers only see `CacheUnavailable` for a fill that
    /// actually failed.
    async fn through_gate<T, F, Fut>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn Collection<R>>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        follow_gates(move || async move { Some(self.gate().await) }, op)
            .await
            .unwrap_or_else(|| {
                Err(StoreError::CacheUnavailable(
                    "cache decorator dropped".to_string(),
                ))
            })
    }

    async fn mirror(&self) -> Result<Arc<dyn Collection<R>>> {
        self.through_gate(|mirror: Arc<dyn Collection<R>>| async move { Ok(mirror) })
            .await
    }

    /// Replaces the current gate with a fresh cache fill.
    ///
    /// Waits for the write-through in progress, so no write straddles the
    /// fill. With `generation` set, the refill only happens if that source
    /// binding is still current. A listener of a replaced source must not
    /// refill from the new one.
    pub(super) async fn refill(&self, reason: &'static str, generation: Option<u64>) {
        let _turn = self.writes.lock().await;
        self.refill_in_turn(reason, generation).await;
    }

    /// [`Shared::refill`] for a caller already holding the write turn.
    async fn refill_in_turn(&self, reason: &'static str, generation: Option<u64>) {
        let mut binding = self.binding.write().await;
        if generation.is_some_and(|expected| expected != binding.generation) {
            return;
        }

        // 1. Stop the running fill and wait out calls already on the mirror
        binding.gate.close().await;

        // 2. Start over with a new gate
        binding.gate = fill_gate(
            Arc::clone(&binding.source),
            Arc::clone(&self.cache),
            self.config.fill_timeout(),
        );

        tracing::info!(reason, generation = binding.generation, "Cache refill started");
    }
}

fn desync(operation: &'static str, key: impl ToString, err: &StoreError) -> StoreError {
    let key = key.to_string();
    tracing::warn!(
        operation,
        key = %key,
        error = %err,
        "Mirror write failed after source write"
    );
    StoreError::mirror_desync(operation, key, err)
}

#[async_trait]
impl<R: Record> Collection<R> for CachingCollection<R> {
    async fn find(&self, key: &R::Key) -> Result<Option<R>> {
        let lookup = key.clone();
        let found = self
            .shared
            .through_gate(move |mirror: Arc<dyn Collection<R>>| async move {
                mirror.find(&lookup).await
            })
            .await?;

        tracing::trace!(key = %key, hit = found.is_some(), "Mirror lookup");
        Ok(found)
    }

    async fn select(&self, sink: &mut dyn Sink<R>, query: &Query<R>) -> Result<usize> {
        let mirror = self.shared.mirror().await?;
        mirror.select(sink, query).await
    }

    async fn put(&self, record: R) -> Result<R> {
        let _turn = self.shared.writes.lock().await;
        let source = self.shared.source().await;

        // 1. Persist to the source; a rejection leaves the mirror untouched
        let stored = source.put(record).await?;

        // 2. Mirror the source's authoritative copy
        let mirrored = stored.clone();
        self.shared
            .through_gate(move |mirror: Arc<dyn Collection<R>>| async move {
                mirror.put(mirrored).await.map(|_| ())
            })
            .await
            .map_err(|err| desync("put", stored.key(), &err))?;

        tracing::debug!(key = %stored.key(), "Record written through");
        Ok(stored)
    }

    async fn remove(&self, record: &R) -> Result<()> {
        let _turn = self.shared.writes.lock().await;
        let source = self.shared.source().await;

        // 1. Remove from the source
        source.remove(record).await?;

        // 2. Remove from the mirror
        let removed = record.clone();
        self.shared
            .through_gate(move |mirror: Arc<dyn Collection<R>>| async move {
                mirror.remove(&removed).await
            })
            .await
            .map_err(|err| desync("remove", record.key(), &err))?;

        tracing::debug!(key = %record.key(), "Record removed through");
        Ok(())
    }

    async fn remove_all(&self, query: &Query<R>) -> Result<usize> {
        let _turn = self.shared.writes.lock().await;
        let source = self.shared.source().await;

        // 1. Resolve the matching records once, on the source
        let matched = source.select_all(query).await?;
        let expected = matched.len();

        // 2. Run the same bulk delete on the source
        let removed = source.remove_all(query).await?;

        // 3. Remove exactly those records from the mirror
        self.shared
            .through_gate(move |mirror: Arc<dyn Collection<R>>| async move {
                for record in &matched {
                    mirror.remove(record).await?;
                }
                Ok(())
            })
            .await
            .map_err(|err| desync("remove_all", format!("{query:?}"), &err))?;

        if removed != expected {
            tracing::warn!(
                removed,
                expected,
                "Source changed during bulk delete, refilling mirror"
            );
            self.shared.refill_in_turn("bulk delete diverged", None).await;
        }

        tracing::debug!(removed, "Bulk delete written through");
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<R>> {
        self.shared.bus.subscribe()
    }
}
