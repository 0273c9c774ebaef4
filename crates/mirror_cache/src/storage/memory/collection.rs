//! In-memory collection implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use mirror_cache_core::events::ChangeEvent;
use mirror_cache_core::storage::{
    apply_query, matching_keys, Collection, Query, Record, Result, Sink,
};

use crate::notify::ChangeBus;

/// Hook applied to every record on `put` before it is stored.
pub type Normalizer<R> = Arc<dyn Fn(R) -> R + Send + Sync>;

/// In-memory collection.
///
/// Records live in a `BTreeMap` keyed by identity behind `Arc<RwLock<_>>`,
/// so the natural iteration order is ascending key. Clones share the same
/// data and the same change bus. Data is lost when the last clone is dropped.
#[derive(Clone)]
pub struct MemoryCollection<R: Record> {
    records: Arc<RwLock<BTreeMap<R::Key, R>>>,
    bus: ChangeBus<R>,
    normalizer: Option<Normalizer<R>>,
}

impl<R: Record> Default for MemoryCollection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> fmt::Debug for MemoryCollection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("subscribers", &self.bus.subscriber_count())
            .field("normalized", &self.normalizer.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Record> MemoryCollection<R> {
    /// Creates a new empty collection with the default bus capacity.
    pub fn new() -> Self {
        Self::with_bus(ChangeBus::default())
    }

    /// Creates a new empty collection publishing on `bus`.
    pub fn with_bus(bus: ChangeBus<R>) -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            bus,
            normalizer: None,
        }
    }

    /// Normalizes every record on `put`, the way a server assigns ids or
    /// timestamps. `put` returns the normalized record.
    pub fn with_normalizer<F>(mut self, normalize: F) -> Self
    where
        F: Fn(R) -> R + Send + Sync + 'static,
    {
        self.normalizer = Some(Arc::new(normalize));
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Replaces the whole contents and publishes a single `Reset`.
    ///
    /// Records are stored as given; the normalizer does not run.
    pub async fn replace_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = R>,
    {
        let replacement: BTreeMap<R::Key, R> =
            records.into_iter().map(|r| (r.key(), r)).collect();
        let count = replacement.len();

        *self.records.write().await = replacement;

        self.bus.publish(ChangeEvent::reset());
        tracing::debug!(count, "Collection contents replaced");
    }
}

#[async_trait]
impl<R: Record> Collection<R> for MemoryCollection<R> {
    async fn find(&self, key: &R::Key) -> Result<Option<R>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn select(&self, sink: &mut dyn Sink<R>, query: &Query<R>) -> Result<usize> {
        // Snapshot first so the lock is not held while the sink awaits
        let selected = {
            let records = self.records.read().await;
            apply_query(records.values().cloned(), query)
        };

        let count = selected.len();
        for record in selected {
            sink.put(record).await?;
        }
        Ok(count)
    }

    async fn put(&self, record: R) -> Result<R> {
        let stored = match &self.normalizer {
            Some(normalize) => normalize(record),
            None => record,
        };

        {
            let mut records = self.records.write().await;
            records.insert(stored.key(), stored.clone());
        }

        self.bus.publish(ChangeEvent::put(stored.clone()));
        Ok(stored)
    }

    async fn remove(&self, record: &R) -> Result<()> {
        let removed = {
            let mut records = self.records.write().await;
            records.remove(&record.key())
        };

        if let Some(removed) = removed {
            self.bus.publish(ChangeEvent::remove(removed));
        }
        Ok(())
    }

    async fn remove_all(&self, query: &Query<R>) -> Result<usize> {
        let removed: Vec<R> = {
            let mut records = self.records.write().await;
            let keys = if query.is_unbounded() {
                records.keys().cloned().collect()
            } else {
                matching_keys(records.values().cloned(), query)
            };
            keys.iter().filter_map(|key| records.remove(key)).collect()
        };

        let count = removed.len();
        for record in removed {
            self.bus.publish(ChangeEvent::remove(record));
        }
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<R>> {
        self.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        name: String,
        version: u32,
    }

    impl Record for Row {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }
    }

    fn row(id: u32, name: &str) -> Row {
        Row {
            id,
            name: name.to_string(),
            version: 0,
        }
    }

    // ==================== CRUD Tests ====================

    #[tokio::test]
    async fn test_put_and_find() {
        let collection = MemoryCollection::new();

        let stored = collection.put(row(1, "a")).await.unwrap();
        assert_eq!(stored, row(1, "a"));

        let found = collection.find(&1).await.unwrap();
        assert_eq!(found, Some(row(1, "a")));
    }

    #[tokio::test]
    async fn test_find_nonexistent() {
        let collection: MemoryCollection<Row> = MemoryCollection::new();
        assert_eq!(collection.find(&42).await.unwrap(), None);
        assert!(!collection.contains(&42).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_is_insert_or_update() {
        let collection = MemoryCollection::new();

        collection.put(row(1, "a")).await.unwrap();
        collection.put(row(1, "b")).await.unwrap();
        collection.put(row(1, "b")).await.unwrap();

        assert_eq!(collection.len().await, 1);
        assert_eq!(collection.find(&1).await.unwrap(), Some(row(1, "b")));
    }

    #[tokio::test]
    async fn test_normalizer_result_is_returned_and_stored() {
        let collection = MemoryCollection::new().with_normalizer(|mut r: Row| {
            r.version += 1;
            r
        });

        let stored = collection.put(row(1, "a")).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(collection.find(&1).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_remove() {
        let collection = MemoryCollection::new();
        collection.put(row(1, "a")).await.unwrap();

        collection.remove(&row(1, "a")).await.unwrap();

        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_noop() {
        let collection: MemoryCollection<Row> = MemoryCollection::new();
        let mut events = collection.subscribe();

        collection.remove(&row(9, "ghost")).await.unwrap();

        assert!(events.try_recv().is_err());
    }

    // ==================== Query Tests ====================

    #[tokio::test]
    async fn test_select_all_in_key_order() {
        let collection = MemoryCollection::new();
        for id in [3, 1, 2] {
            collection.put(row(id, "x")).await.unwrap();
        }

        let rows = collection.select_all(&Query::all()).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_select_with_query_counts_delivered() {
        let collection = MemoryCollection::new();
        for id in 1..=6 {
            collection.put(row(id, "x")).await.unwrap();
        }

        let query = Query::all()
            .filter(|r: &Row| r.id % 2 == 0)
            .order_by(|a: &Row, b: &Row| b.id.cmp(&a.id))
            .limit(2);
        let mut sink = mirror_cache_core::storage::VecSink::new();
        let count = collection.select(&mut sink, &query).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            sink.records().iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![6, 4]
        );
    }

    #[tokio::test]
    async fn test_select_evaluates_predicate_once_per_record() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let collection = MemoryCollection::new();
        for id in 1..=3 {
            collection.put(row(id, "x")).await.unwrap();
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let query = Query::all().filter(move |r: &Row| {
            counted.fetch_add(1, Ordering::SeqCst);
            r.id != 2
        });
        let mut sink = mirror_cache_core::storage::VecSink::new();
        let count = collection.select(&mut sink, &query).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_remove_all_with_query() {
        let collection = MemoryCollection::new();
        for id in 1..=5 {
            collection.put(row(id, "x")).await.unwrap();
        }

        let removed = collection
            .remove_all(&Query::all().filter(|r: &Row| r.id > 3))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(collection.len().await, 3);
        assert!(collection.find(&4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_all_unbounded_clears() {
        let collection = MemoryCollection::new();
        for id in 1..=3 {
            collection.put(row(id, "x")).await.unwrap();
        }

        assert_eq!(collection.remove_all(&Query::all()).await.unwrap(), 3);
        assert!(collection.is_empty().await);
    }

    // ==================== Notification Tests ====================

    #[tokio::test]
    async fn test_put_publishes_stored_record() {
        let collection = MemoryCollection::new().with_normalizer(|mut r: Row| {
            r.version = 7;
            r
        });
        let mut events = collection.subscribe();

        collection.put(row(1, "a")).await.unwrap();

        match events.recv().await.unwrap() {
            ChangeEvent::Put { record } => assert_eq!(record.version, 7),
            other => panic!("Expected Put event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remove_all_publishes_one_remove_per_record() {
        let collection = MemoryCollection::new();
        collection.put(row(1, "a")).await.unwrap();
        collection.put(row(2, "b")).await.unwrap();
        let mut events = collection.subscribe();

        collection.remove_all(&Query::all()).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), ChangeEvent::remove(row(1, "a")));
        assert_eq!(events.recv().await.unwrap(), ChangeEvent::remove(row(2, "b")));
    }

    #[tokio::test]
    async fn test_replace_all_publishes_reset() {
        let collection = MemoryCollection::new();
        collection.put(row(1, "a")).await.unwrap();
        let mut events = collection.subscribe();

        collection.replace_all(vec![row(5, "e"), row(6, "f")]).await;

        assert_eq!(events.recv().await.unwrap(), ChangeEvent::Reset);
        assert_eq!(collection.len().await, 2);
        assert!(collection.find(&1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let collection = MemoryCollection::new();
        let other = collection.clone();

        other.put(row(1, "a")).await.unwrap();

        assert_eq!(collection.find(&1).await.unwrap(), Some(row(1, "a")));
    }
}
