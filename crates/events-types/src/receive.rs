//! # Receive Result
//!
//! What a subscriber hands back to its caller, and its JSON form used when
//! bridging to other languages.

use crate::errors::EventsError;
use crate::payload::{parse_event, EventParams};
use serde::{Deserialize, Serialize};

/// Outcome of one receive call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReceiveOp {
    /// 0 on success, positive on timeout, negative on failure.
    pub rc: i32,
    /// The event payload string; empty unless `rc == 0`.
    pub event: String,
    /// Events detected as lost while producing this result.
    #[serde(rename = "missed_cnt")]
    pub missed_count: u64,
    /// Publish time in microseconds since the Unix epoch.
    pub publish_epoch: u64,
}

impl EventReceiveOp {
    /// A delivered event.
    #[must_use]
    pub fn delivered(event: String, missed_count: u64, publish_epoch: u64) -> Self {
        Self {
            rc: 0,
            event,
            missed_count,
            publish_epoch,
        }
    }

    /// A failed or timed out receive, carrying whatever loss was counted first.
    #[must_use]
    pub fn failed(error: &EventsError, missed_count: u64) -> Self {
        Self {
            rc: error.rc(),
            missed_count,
            ..Self::default()
        }
    }

    /// Whether an event was delivered.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.rc == 0
    }

    /// Serialize as `{"rc":..,"event":..,"missed_cnt":..,"publish_epoch":..}`.
    pub fn to_json(&self) -> Result<String, EventsError> {
        serde_json::to_string(self).map_err(|e| EventsError::MalformedPayload(e.to_string()))
    }

    /// Parse the form produced by [`to_json`](Self::to_json).
    pub fn from_json(s: &str) -> Result<Self, EventsError> {
        serde_json::from_str(s).map_err(|e| EventsError::MalformedPayload(e.to_string()))
    }

    /// Split the event payload into its `"<source>:<tag>"` key and params.
    pub fn parse_event(&self) -> Result<(String, EventParams), EventsError> {
        parse_event(&self.event)
    }
}
