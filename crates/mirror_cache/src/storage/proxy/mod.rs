//! Pass-through decorator.
//!
//! [`ProxyCollection`] forwards every operation to a replaceable delegate.
//! Specialized decorators start from this shape and change only the
//! operations they need to.

mod collection;

pub use collection::ProxyCollection;
