use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use mirror_cache_core::storage::{Result, StoreError};

/// Observable state of a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// Preparation is running; calls are queued.
    Pending,
    /// The delegate is prepared; calls are forwarded directly.
    Ready,
    /// Preparation failed or timed out; every call fails.
    Failed,
    /// The gate was superseded by a newer one; every call fails.
    Closed,
}

/// A call parked until preparation settles.
struct Deferred<D: ?Sized> {
    run: Box<dyn FnOnce(Result<Arc<D>>) -> BoxFuture<'static, ()> + Send>,
}

enum GateState<D: ?Sized> {
    Pending(VecDeque<Deferred<D>>),
    Ready(Arc<D>),
    Failed(StoreError),
    Closed,
}

impl<D: ?Sized> GateState<D> {
    fn status(&self) -> GateStatus {
        match self {
            Self::Pending(_) => GateStatus::Pending,
            Self::Ready(_) => GateStatus::Ready,
            Self::Failed(_) => GateStatus::Failed,
            Self::Closed => GateStatus::Closed,
        }
    }
}

/// Deferred-delegate gate.
///
/// Holds calls against a delegate that is still being prepared and replays
/// them, in submission order, once preparation succeeds. Calls arriving
/// while the queue drains are appended to it, so nothing overtakes an
/// earlier call. If preparation fails or times out the gate fails every
/// queued and future call with [`StoreError::CacheUnavailable`].
pub struct Gate<D: ?Sized> {
    state: Arc<Mutex<GateState<D>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    /// Held shared by every call forwarded directly to a ready delegate.
    running: RwLock<()>,
}

impl<D> Gate<D>
where
    D: ?Sized + Send + Sync + 'static,
{
    /// Creates a gate and starts driving `preparation` on the runtime.
    ///
    /// # Arguments
    ///
    /// * `preparation` - Future resolving to the prepared delegate
    /// * `timeout` - Upper bound for preparation, `None` to wait forever
    pub fn new<F>(preparation: F, timeout: Option<Duration>) -> Self
    where
        F: Future<Output = Result<Arc<D>>> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(GateState::Pending(VecDeque::new())));
        let driver = tokio::spawn(drive(Arc::clone(&state), preparation, timeout));
        Self {
            state,
            driver: Mutex::new(Some(driver)),
            running: RwLock::new(()),
        }
    }

    /// Creates a gate that is ready from the start.
    pub fn prepared(delegate: Arc<D>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::Ready(delegate))),
            driver: Mutex::new(None),
            running: RwLock::new(()),
        }
    }

    pub async fn status(&self) -> GateStatus {
        self.state.lock().await.status()
    }

    /// Runs `op` against the delegate, waiting for preparation if needed.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<D>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T>>();

        let mut state = self.state.lock().await;
        let ready = match &*state {
            GateState::Ready(delegate) => Some(Arc::clone(delegate)),
            GateState::Failed(err) => return Err(err.clone()),
            GateState::Closed => return Err(superseded()),
            GateState::Pending(_) => None,
        };

        if let Some(delegate) = ready {
            // Taken before the state lock is released, so `close` sees it
            let _running = self.running.read().await;
            drop(state);
            return op(delegate).await;
        }

        let GateState::Pending(queue) = &mut *state else {
            return Err(superseded());
        };
        queue.push_back(Deferred {
            run: Box::new(move |prepared: Result<Arc<D>>| {
                async move {
                    // Caller went away while queued
                    if tx.is_closed() {
                        return;
                    }
                    let result = match prepared {
                        Ok(delegate) => op(delegate).await,
                        Err(err) => Err(err),
                    };
                    let _ = tx.send(result);
                }
                .boxed()
            }),
        });
        drop(state);

        rx.await.unwrap_or_else(|_| {
            Err(StoreError::CacheUnavailable(
                "gate closed before the call completed".to_string(),
            ))
        })
    }

    /// Waits for preparation and returns the delegate.
    ///
    /// Queued behind every call submitted earlier, so once this returns
    /// those calls have been applied.
    pub async fn ready(&self) -> Result<Arc<D>> {
        self.call(|delegate| async move { Ok(delegate) }).await
    }

    /// Closes the gate after it has been superseded.
    ///
    /// Stops a running preparation and fails queued calls with
    /// `CacheUnavailable`. Calls already forwarded to a ready delegate are
    /// awaited, so nothing reaches the delegate once this returns. Every
    /// later call fails with `CacheUnavailable`.
    pub async fn close(&self) {
        let queued = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, GateState::Closed) {
                GateState::Pending(queue) => queue,
                _ => VecDeque::new(),
            }
        };

        drop(self.running.write().await);

        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
            let _ = driver.await;
        }

        for deferred in queued {
            (deferred.run)(Err(superseded())).await;
        }
    }
}

impl<D: ?Sized> Drop for Gate<D> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

fn superseded() -> StoreError {
    StoreError::CacheUnavailable("gate superseded by a newer cache fill".to_string())
}

async fn drive<D, F>(state: Arc<Mutex<GateState<D>>>, preparation: F, timeout: Option<Duration>)
where
    D: ?Sized + Send + Sync + 'static,
    F: Future<Output = Result<Arc<D>>> + Send + 'static,
{
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, preparation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::CacheUnavailable(format!(
                "preparation timed out after {}ms",
                limit.as_millis()
            ))),
        },
        None => preparation.await,
    };

    match outcome {
        Ok(delegate) => {
            let mut replayed = 0usize;
            loop {
                let next = {
                    let mut state = state.lock().await;
                    let popped = match &mut *state {
                        GateState::Pending(queue) => queue.pop_front(),
                        // Closed while preparing
                        _ => return,
                    };
                    if popped.is_none() {
                        *state = GateState::Ready(Arc::clone(&delegate));
                    }
                    popped
                };

                match next {
                    Some(deferred) => {
                        (deferred.run)(Ok(Arc::clone(&delegate))).await;
                        replayed += 1;
                    }
                    None => break,
                }
            }
            tracing::debug!(replayed, "Gate ready");
        }
        Err(err) => {
            let err = err.into_unavailable();
            tracing::warn!(error = %err, "Gate preparation failed");

            let queued = {
                let mut state = state.lock().await;
                if !matches!(&*state, GateState::Pending(_)) {
                    return;
                }
                match std::mem::replace(&mut *state, GateState::Failed(err.clone())) {
                    GateState::Pending(queue) => queue,
                    _ => VecDeque::new(),
                }
            };

            for deferred in queued {
                (deferred.run)(Err(err.clone())).await;
            }
        }
    }
}
