//! Change notification plumbing.
//!
//! - [`ChangeBus`]: the publish/subscribe channel owned by each collection
//! - [`EventRelay`]: re-publishes one collection's events on another bus

mod bus;
mod relay;

pub use bus::{ChangeBus, DEFAULT_CAPACITY};
pub use relay::EventRelay;
