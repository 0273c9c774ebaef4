//! Contracts shared by every collection in the workspace.
//!
//! This crate holds the collection trait, query and error types, change
//! events and the pure functions stores use to evaluate queries. It performs
//! no I/O and spawns no tasks; runtime implementations live in `mirror_cache`.

pub mod events;
pub mod storage;
