//! # Events Types Crate
//!
//! Types shared by the publisher and subscriber sides of the event bus.
//!
//! ## Contents
//!
//! - **Wire codec**: the three-field event record and its two-part framing
//! - **Payload**: the `{"<source>:<tag>": {params}}` application payload
//! - **Receive result**: what a subscriber returns, and its JSON form
//! - **Config**: endpoints and limits read from the init config file
//! - **Errors**: the error taxonomy and its integer return codes

pub mod config;
pub mod errors;
pub mod payload;
pub mod receive;
pub mod wire;

pub use config::EventsConfig;
pub use errors::{EventsError, RC_TIMEOUT};
pub use payload::{encode_event, event_key, parse_event, EventParams, TIMESTAMP_PARAM};
pub use receive::EventReceiveOp;
pub use wire::{
    EventRecord, Sequence, WireMessage, CONTROL_DEINIT, CONTROL_PREFIX, SEQUENCE_MAX,
};
