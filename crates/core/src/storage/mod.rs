mod error;
mod operations;
mod query;
mod sink;
mod traits;

pub use error::{ErrorKind, Result, StoreError};
pub use operations::{apply_query, matching_keys};
pub use query::{Comparator, Predicate, Query};
pub use sink::{CollectionSink, VecSink};
pub use traits::{Collection, Record, Sink};
