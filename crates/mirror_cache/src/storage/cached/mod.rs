//! Caching decorator.
//!
//! [`CachingCollection`] keeps a complete copy of a source collection in a
//! mirror collection. The mirror is filled behind a [`Gate`](crate::gate::Gate),
//! kept current by a listener on the source's change notifications, and
//! refilled whenever the source resets or is replaced.

mod collection;
mod sync;

pub use collection::CachingCollection;
