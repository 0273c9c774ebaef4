use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events::ChangeEvent;

use super::sink::VecSink;
use super::{Query, Result};

/// An identity-bearing value stored in a [`Collection`].
///
/// Collections never look inside a record beyond its key.
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    type Key: Clone + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Returns the identity of this record.
    fn key(&self) -> Self::Key;
}

/// Receiver for records streamed out of [`Collection::select`].
#[async_trait]
pub trait Sink<R: Record>: Send {
    /// Accepts one record.
    async fn put(&mut self, record: R) -> Result<()>;
}

/// Key-addressable store contract.
///
/// Implemented by backing stores, by local mirrors and by decorators, which
/// lets a decorator stand in wherever a plain store is expected.
#[async_trait]
pub trait Collection<R: Record>: Send + Sync {
    /// Gets a record by key. Absence is `Ok(None)`, not an error.
    async fn find(&self, key: &R::Key) -> Result<Option<R>>;

    /// Streams the records selected by `query` into `sink`, in query order.
    ///
    /// Returns the number of records delivered.
    async fn select(&self, sink: &mut dyn Sink<R>, query: &Query<R>) -> Result<usize>;

    /// Inserts or updates a record by identity.
    ///
    /// Returns the stored record. A store may normalize fields, so callers
    /// must treat the returned value as authoritative.
    async fn put(&self, record: R) -> Result<R>;

    /// Deletes a record by identity. Deleting an absent record is a no-op.
    async fn remove(&self, record: &R) -> Result<()>;

    /// Deletes every record selected by `query`. Returns how many were removed.
    async fn remove_all(&self, query: &Query<R>) -> Result<usize>;

    /// Subscribes to change notifications.
    ///
    /// Events are published after the corresponding mutation commits.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<R>>;

    /// Collects the records selected by `query` into a vector.
    async fn select_all(&self, query: &Query<R>) -> Result<Vec<R>> {
        let mut sink = VecSink::new();
        self.select(&mut sink, query).await?;
        Ok(sink.into_inner())
    }

    /// Returns true if a record with `key` exists.
    async fn contains(&self, key: &R::Key) -> Result<bool> {
        Ok(self.find(key).await?.is_some())
    }
}
