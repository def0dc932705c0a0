//! # Events Bus
//!
//! Process-local event notification: many publishers, at most one
//! subscriber per process, loss detection through per-publisher sequence
//! numbers, and a cache handoff so events are not lost while the subscriber
//! restarts.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐ PUB   ┌───────────────┐  SUB  ┌──────────────────┐
//! │ Publisher A │ ────→ │               │ ────→ │                  │
//! ├─────────────┤       │ fan-out proxy │       │    Subscriber    │──→ caller
//! │ Publisher B │ ────→ │               │ ──┐   │ (track, dedupe)  │
//! └─────────────┘       └───────────────┘   │   └──────────────────┘
//!                                           │            ↑ replay
//!                                           │   ┌──────────────────┐
//!                                           └─→ │  cache service   │
//!                                               └──────────────────┘
//! ```
//!
//! ## Handoff
//!
//! - Subscriber start: stop the cache; if one was running, serve its records
//!   before the live socket.
//! - Subscriber shutdown: arm the cache, drain the live socket for up to one
//!   second, start the cache seeded with what was drained.
//! - Records seen on both paths are dropped as duplicates by sequence.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod bridge;
pub mod ports;
pub mod publisher;
pub mod registry;
pub mod subscriber;
pub mod track;

pub use adapters::{InMemoryEventService, InMemoryProxy};
pub use bridge::EventsBridge;
pub use ports::{EventServiceClient, EventServiceConnector, PubSocket, SubSocket, Transport};
pub use publisher::EventPublisher;
pub use registry::{EventHandle, EventsRegistry};
pub use subscriber::{
    missed_between, EventSubscriber, SubscriberOptions, SubscriberState, SubscriberStats,
};
pub use track::{RuntimeIdTracker, TrackEntry};

use std::time::Duration;

/// Expected ceiling on concurrent publisher runtime ids. A guideline for
/// the tracking table, not a limit on publishers.
pub const MAX_PUBLISHERS_COUNT: usize = 1000;

/// Growth allowed past [`MAX_PUBLISHERS_COUNT`] before pruning.
pub const PRUNE_SLACK: usize = 10;

/// Event service timeout on the publisher side.
pub const PUBLISHER_SERVICE_TIMEOUT: Duration = Duration::from_millis(200);

/// Event service timeout on the subscriber side.
pub const SUBSCRIBER_SERVICE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Longest the subscriber drains its socket during shutdown.
pub const CACHE_DRAIN_WINDOW: Duration = Duration::from_millis(1000);

/// Payload of the pacing echo.
pub const ECHO_PAYLOAD: &str = "hello";

/// Messages buffered per SUB socket by the in-memory proxy.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
