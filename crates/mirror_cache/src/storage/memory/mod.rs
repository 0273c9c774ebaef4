//! In-memory storage backend.
//!
//! This module provides an in-memory implementation of the collection trait
//! that stores records in an ordered map wrapped in `Arc<RwLock<_>>`. It
//! serves as the mirror behind a caching decorator and as a source in tests
//! and demos.
//!
//! # Example
//!
//! ```rust,ignore
//! use mirror_cache::storage::memory::MemoryCollection;
//!
//! let mirror = MemoryCollection::<Document>::new();
//! ```

mod collection;

pub use collection::{MemoryCollection, Normalizer};
