//! Write-through caching over abstract collections.
//!
//! The contracts ([`Collection`](mirror_cache_core::storage::Collection),
//! queries, change events and errors) live in `mirror_cache_core`. This crate
//! provides the runtime pieces: the change bus, the deferred-delegate gate,
//! the in-memory store and the pass-through and caching decorators.

pub mod config;
pub mod gate;
pub mod models;
pub mod notify;
pub mod storage;
