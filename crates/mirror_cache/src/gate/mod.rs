//! Readiness barrier for a delegate that is still being prepared.
//!
//! A [`Gate`] starts `Pending`, queueing every call, and flips to `Ready`
//! exactly once when its preparation future succeeds. Queued calls replay in
//! order against the prepared delegate before any new call is forwarded.
//! Failure is terminal. A gate is never reset; re-running preparation means
//! building a new gate and closing the old one.

mod deferred;

pub use deferred::{Gate, GateStatus};
