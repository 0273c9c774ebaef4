use async_trait::async_trait;

use super::traits::{Collection, Record, Sink};
use super::Result;

/// Sink that buffers records in memory.
#[derive(Debug, Clone)]
pub struct VecSink<R> {
    records: Vec<R>,
}

impl<R> VecSink<R> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Returns the records received so far.
    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn into_inner(self) -> Vec<R> {
        self.records
    }
}

impl<R> Default for VecSink<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Sink<R> for VecSink<R> {
    async fn put(&mut self, record: R) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

/// Sink that writes every record into a collection.
///
/// Selecting one collection into a `CollectionSink` over another copies it,
/// which is how a mirror is filled from its source.
pub struct CollectionSink<'a, R: Record> {
    target: &'a dyn Collection<R>,
}

impl<'a, R: Record> CollectionSink<'a, R> {
    pub fn new(target: &'a dyn Collection<R>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl<R: Record> Sink<R> for CollectionSink<'_, R> {
    async fn put(&mut self, record: R) -> Result<()> {
        self.target.put(record).await.map(|_| ())
    }
}
