use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Shared record filter.
pub type Predicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Shared record comparator.
pub type Comparator<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

/// Selection parameters shared by `select` and `remove_all`.
///
/// The default query matches every record in ascending key order. The
/// predicate and comparator must be pure: a caching decorator evaluates the
/// same query twice against its source and expects the same answer.
pub struct Query<R> {
    /// Number of matching records to skip after ordering.
    pub skip: Option<usize>,
    /// Maximum number of records to return after skipping.
    pub limit: Option<usize>,
    order: Option<Comparator<R>>,
    predicate: Option<Predicate<R>>,
}

impl<R> Query<R> {
    /// A query matching every record.
    pub fn all() -> Self {
        Self {
            skip: None,
            limit: None,
            order: None,
            predicate: None,
        }
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Orders matches with `compare`. Ties are broken by record key.
    pub fn order_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&R, &R) -> Ordering + Send + Sync + 'static,
    {
        self.order = Some(Arc::new(compare));
        self
    }

    /// Restricts matches to records accepted by `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Returns true if `record` passes the predicate (or there is none).
    pub fn matches(&self, record: &R) -> bool {
        self.predicate.as_ref().is_none_or(|p| p(record))
    }

    /// Compares two records with the caller's order, `Equal` if unordered.
    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        self.order.as_ref().map_or(Ordering::Equal, |cmp| cmp(a, b))
    }

    /// Returns true if this query selects every record in key order.
    pub fn is_unbounded(&self) -> bool {
        self.skip.is_none() && self.limit.is_none() && self.predicate.is_none()
    }
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Self {
            skip: self.skip,
            limit: self.limit,
            order: self.order.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<R> Default for Query<R> {
    fn default() -> Self {
        Self::all()
    }
}

impl<R> fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("ordered", &self.order.is_some())
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}
