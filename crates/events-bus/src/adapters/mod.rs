//! In-memory adapters for the transport and event service ports.
//!
//! Suitable for single-process operation and tests; a deployment talking to
//! a real proxy and event daemon plugs in its own implementations of the
//! traits in [`crate::ports`].

pub mod proxy;
pub mod service;

pub use proxy::InMemoryProxy;
pub use service::{InMemoryEventService, DEFAULT_READ_BATCH};
