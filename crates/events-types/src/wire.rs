//! # Wire Codec
//!
//! Events travel as a two-part message:
//!
//! ```text
//! ┌────────────────────┐ ┌───────────────────────────────────────────────┐
//! │ part 1: source     │ │ part 2: {"d": data, "r": runtime_id,          │
//! │ (topic filtering)  │ │          "s": "sequence", "t": "epoch_usecs"} │
//! └────────────────────┘ └───────────────────────────────────────────────┘
//! ```
//!
//! Key names are kept to one letter since the record crosses the wire and is
//! stored by the cache service.

use crate::errors::EventsError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-runtime-id sequence counter. Wraps to 0, which marks a rollover.
pub type Sequence = u32;

/// Largest sequence value before wraparound.
pub const SEQUENCE_MAX: Sequence = Sequence::MAX;

/// Prefix reserved for bus bookkeeping events.
pub const CONTROL_PREFIX: &str = "CTRL_";

/// Control value announcing that a runtime id is retiring.
pub const CONTROL_DEINIT: &str = "CTRL_DEINIT";

/// Serialized form of part 2.
#[derive(Debug, Serialize, Deserialize)]
struct RawRecord {
    #[serde(rename = "d")]
    data: String,
    #[serde(rename = "r")]
    runtime_id: String,
    #[serde(rename = "s")]
    sequence: String,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    epoch: Option<String>,
}

/// A decoded event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Application payload or a control value.
    pub data: String,
    /// Identity of the live publisher instance.
    pub runtime_id: String,
    /// Sequence within `runtime_id`.
    pub sequence: Sequence,
    /// Publish time in microseconds since the Unix epoch (0 if absent).
    pub publish_epoch: u64,
}

impl EventRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(data: impl Into<String>, runtime_id: impl Into<String>, sequence: Sequence) -> Self {
        Self {
            data: data.into(),
            runtime_id: runtime_id.into(),
            sequence,
            publish_epoch: now_epoch_micros(),
        }
    }

    /// Whether this is a bus bookkeeping event.
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.data.starts_with(CONTROL_PREFIX)
    }

    /// Whether this is the retirement notice for `runtime_id`.
    #[must_use]
    pub fn is_deinit(&self) -> bool {
        self.data == CONTROL_DEINIT
    }

    /// Serialize into the part 2 string.
    pub fn encode(&self) -> Result<String, EventsError> {
        let raw = RawRecord {
            data: self.data.clone(),
            runtime_id: self.runtime_id.clone(),
            sequence: self.sequence.to_string(),
            epoch: Some(self.publish_epoch.to_string()),
        };
        serde_json::to_string(&raw).map_err(|e| EventsError::MalformedRecord(e.to_string()))
    }

    /// Parse a part 2 string.
    ///
    /// # Errors
    ///
    /// `EventsError::MalformedRecord` when a required field is missing or the
    /// sequence/epoch is not a decimal number of the right width.
    pub fn decode(s: &str) -> Result<Self, EventsError> {
        let raw: RawRecord =
            serde_json::from_str(s).map_err(|e| EventsError::MalformedRecord(e.to_string()))?;

        let sequence = raw.sequence.parse::<Sequence>().map_err(|_| {
            EventsError::MalformedRecord(format!("bad sequence {:?}", raw.sequence))
        })?;

        let publish_epoch = match raw.epoch {
            Some(t) => t
                .parse::<u64>()
                .map_err(|_| EventsError::MalformedRecord(format!("bad epoch {t:?}")))?,
            None => 0,
        };

        Ok(Self {
            data: raw.data,
            runtime_id: raw.runtime_id,
            sequence,
            publish_epoch,
        })
    }
}

/// A two-part transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Part 1: the event source, used as the transport topic.
    pub source: String,
    /// Part 2: the encoded [`EventRecord`].
    pub payload: String,
}

impl WireMessage {
    /// Frame a record under `source`.
    pub fn frame(source: impl Into<String>, record: &EventRecord) -> Result<Self, EventsError> {
        Ok(Self {
            source: source.into(),
            payload: record.encode()?,
        })
    }

    /// Decode part 2.
    pub fn record(&self) -> Result<EventRecord, EventsError> {
        EventRecord::decode(&self.payload)
    }
}

/// Current time in microseconds since the Unix epoch.
#[must_use]
pub fn now_epoch_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Current time in whole seconds since the Unix epoch.
#[must_use]
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
