//! Collection implementations.
//!
//! - [`memory`]: in-memory store, used as mirror and as test source
//! - [`proxy`]: pass-through decorator over a replaceable delegate
//! - [`cached`]: the caching decorator

pub mod cached;
pub mod memory;
pub mod proxy;

#[cfg(test)]
pub(crate) mod mock;

pub use cached::CachingCollection;
pub use memory::MemoryCollection;
pub use proxy::ProxyCollection;
