//! Mirror maintenance: the cache fill and the source listener.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use mirror_cache_core::events::ChangeEvent;
use mirror_cache_core::storage::{Collection, CollectionSink, Query, Record, Result};

use crate::gate::{Gate, GateStatus};

use super::collection::Shared;

/// Starts a fill of `cache` from `source` behind a new gate.
pub(super) fn fill_gate<R: Record>(
    source: Arc<dyn Collection<R>>,
    cache: Arc<dyn Collection<R>>,
    timeout: Option<Duration>,
) -> Arc<Gate<dyn Collection<R>>> {
    Arc::new(Gate::new(fill(source, cache), timeout))
}

/// Replaces the contents of `cache` with a complete copy of `source`.
async fn fill<R: Record>(
    source: Arc<dyn Collection<R>>,
    cache: Arc<dyn Collection<R>>,
) -> Result<Arc<dyn Collection<R>>> {
    let started = Instant::now();
    tracing::debug!("Cache fill started");

    // 1. Drop whatever a previous fill left behind
    let cleared = cache.remove_all(&Query::all()).await.inspect_err(|err| {
        tracing::warn!(error = %err, "Failed to clear mirror before fill");
    })?;

    // 2. Stream every source record into the mirror
    let copied = source
        .select(&mut CollectionSink::new(cache.as_ref()), &Query::all())
        .await
        .inspect_err(|err| {
            tracing::warn!(error = %err, "Cache fill failed");
        })?;

    tracing::info!(
        cleared,
        copied,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Cache fill complete"
    );
    Ok(cache)
}

/// Runs `op` against the mirror behind the gate `current` returns.
///
/// A gate closed by a refill while the call waited is followed to the one
/// `current` returns next. `None` once the decorator is gone.
pub(super) async fn follow_gates<R, T, F, Fut, G, GFut>(
    mut current: G,
    op: F,
) -> Option<Result<T>>
where
    R: Record,
    T: Send + 'static,
    F: FnOnce(Arc<dyn Collection<R>>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    G: FnMut() -> GFut,
    GFut: Future<Output = Option<Arc<Gate<dyn Collection<R>>>>>,
{
    let mut gate = current().await?;
    loop {
        let result = gate.call(op.clone()).await;
        if result.is_err() && gate.status().await == GateStatus::Closed {
            let next = current().await?;
            if !Arc::ptr_eq(&next, &gate) {
                tracing::trace!("Following superseded gate to the new cache fill");
                gate = next;
                continue;
            }
        }
        return Some(result);
    }
}

/// The decorator's current gate. The decorator is only kept alive for the
/// lookup, never while a call waits on the gate.
async fn current_gate<R: Record>(
    shared: &Weak<Shared<R>>,
) -> Option<Arc<Gate<dyn Collection<R>>>> {
    let shared = shared.upgrade()?;
    Some(shared.gate().await)
}

/// Applies a source `Put` to the mirror. Idempotent by key.
pub(super) async fn apply_put<R: Record>(shared: &Weak<Shared<R>>, record: R) {
    let key = record.key();
    let applied = follow_gates(
        move || current_gate(shared),
        move |mirror: Arc<dyn Collection<R>>| async move { mirror.put(record).await.map(|_| ()) },
    )
    .await;

    match applied {
        Some(Ok(())) => tracing::trace!(key = %key, "Applied source put to mirror"),
        Some(Err(err)) => {
            tracing::warn!(key = %key, error = %err, "Failed to apply source put to mirror")
        }
        None => {}
    }
}

/// Applies a source `Remove` to the mirror. Removing a missing record is a no-op.
pub(super) async fn apply_remove<R: Record>(shared: &Weak<Shared<R>>, record: R) {
    let key = record.key();
    let applied = follow_gates(
        move || current_gate(shared),
        move |mirror: Arc<dyn Collection<R>>| async move { mirror.remove(&record).await },
    )
    .await;

    match applied {
        Some(Ok(())) => tracing::trace!(key = %key, "Applied source remove to mirror"),
        Some(Err(err)) => {
            tracing::warn!(key = %key, error = %err, "Failed to apply source remove to mirror")
        }
        None => {}
    }
}

async fn refill<R: Record>(shared: &Weak<Shared<R>>, reason: &'static str, generation: u64) {
    if let Some(shared) = shared.upgrade() {
        shared.refill(reason, Some(generation)).await;
    }
}

/// Applies source change events to the mirror until the source goes away.
///
/// Parked until `armed` fires so it never sees a decorator that is still
/// being built. Holds only a weak reference while waiting on the mirror.
pub(super) async fn listen<R: Record>(
    shared: Weak<Shared<R>>,
    events: broadcast::Receiver<ChangeEvent<R>>,
    armed: oneshot::Receiver<()>,
    generation: u64,
) {
    if armed.await.is_err() {
        return;
    }

    let mut events = BroadcastStream::new(events);
    while let Some(item) = events.next().await {
        if shared.strong_count() == 0 {
            break;
        }

        match item {
            Ok(ChangeEvent::Put { record }) => apply_put(&shared, record).await,
            Ok(ChangeEvent::Remove { record }) => apply_remove(&shared, record).await,
            Ok(ChangeEvent::Reset) => refill(&shared, "source reset", generation).await,
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(missed, generation, "Source listener lagged");
                refill(&shared, "listener lagged", generation).await;
            }
        }
    }

    tracing::debug!(generation, "Source listener stopped");
}
