//! # SONiC Events Test Suite
//!
//! End-to-end flows across publishers, the in-memory proxy, the cache
//! service and the subscriber.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs      # Delivery, loss, duplicates, deinit, pruning
//!     └── handoff.rs    # Cache handoff across subscriber restarts
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p events-tests
//! cargo test -p events-tests integration::handoff
//! ```

#![allow(dead_code)]

pub mod integration;
