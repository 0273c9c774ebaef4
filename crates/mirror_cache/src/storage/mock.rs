//! Scriptable collection for decorator tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use mirror_cache_core::events::ChangeEvent;
use mirror_cache_core::storage::{Collection, Query, Record, Result, Sink, StoreError};

use super::memory::MemoryCollection;
use crate::notify::ChangeBus;

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: u32,
    pub name: String,
}

impl Record for Item {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }
}

pub fn item(id: u32, name: &str) -> Item {
    Item {
        id,
        name: name.to_string(),
    }
}

/// Memory-backed collection whose failures and latencies tests can script.
///
/// Writes made through [`ScriptedCollection::store`] bypass every knob and
/// still publish events, which makes them look like out-of-band writes.
pub struct ScriptedCollection<R: Record> {
    pub store: MemoryCollection<R>,
    pub fail_select: AtomicBool,
    pub hang_select: AtomicBool,
    pub fail_puts: AtomicBool,
    pub fail_removes: AtomicBool,
    /// The next select delivers nothing, as if it ran before a concurrent insert.
    pub stale_next_select: AtomicBool,
    put_delays: Mutex<VecDeque<Duration>>,
    put_log: Mutex<Vec<R::Key>>,
    muted: Option<ChangeBus<R>>,
}

impl<R: Record> ScriptedCollection<R> {
    pub fn new() -> Self {
        Self::over(MemoryCollection::new())
    }

    pub fn over(store: MemoryCollection<R>) -> Self {
        Self {
            store,
            fail_select: AtomicBool::new(false),
            hang_select: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            stale_next_select: AtomicBool::new(false),
            put_delays: Mutex::new(VecDeque::new()),
            put_log: Mutex::new(Vec::new()),
            muted: None,
        }
    }

    /// A collection whose subscribers never hear about any change.
    pub fn muted() -> Self {
        Self {
            muted: Some(ChangeBus::default()),
            ..Self::new()
        }
    }

    /// Delays the next puts, one entry per put in arrival order.
    pub async fn delay_puts(&self, delays: impl IntoIterator<Item = Duration>) {
        self.put_delays.lock().await.extend(delays);
    }

    /// Keys of successful puts, in completion order.
    pub async fn put_log(&self) -> Vec<R::Key> {
        self.put_log.lock().await.clone()
    }
}

#[async_trait]
impl<R: Record> Collection<R> for ScriptedCollection<R> {
    async fn find(&self, key: &R::Key) -> Result<Option<R>> {
        self.store.find(key).await
    }

    async fn select(&self, sink: &mut dyn Sink<R>, query: &Query<R>) -> Result<usize> {
        if self.hang_select.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_select.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("scripted select failure".to_string()));
        }
        if self.stale_next_select.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }
        self.store.select(sink, query).await
    }

    async fn put(&self, record: R) -> Result<R> {
        let delay = self.put_delays.lock().await.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected("scripted put failure".to_string()));
        }

        let stored = self.store.put(record).await?;
        self.put_log.lock().await.push(stored.key());
        Ok(stored)
    }

    async fn remove(&self, record: &R) -> Result<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected("scripted remove failure".to_string()));
        }
        self.store.remove(record).await
    }

    async fn remove_all(&self, query: &Query<R>) -> Result<usize> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected("scripted remove failure".to_string()));
        }
        self.store.remove_all(query).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<R>> {
        match &self.muted {
            Some(silent) => silent.subscribe(),
            None => self.store.subscribe(),
        }
    }
}

/// Polls `check` until it holds, panicking after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let polling = async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), polling)
        .await
        .expect("condition not met within 2s");
}
