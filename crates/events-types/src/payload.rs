//! # Event Payload
//!
//! The application payload carried in a record's `data` field is a JSON
//! object with a single key `"<source>:<tag>"` mapping to the string
//! parameters of the event:
//!
//! ```text
//! {"orchagent:port-up": {"iface": "Ethernet0", "timestamp": "2022-05-21T04:05:06.123456Z"}}
//! ```

use crate::errors::EventsError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Event parameters. Ordered so the encoded payload is deterministic.
pub type EventParams = BTreeMap<String, String>;

/// Parameter injected by publishers when the caller did not supply one.
pub const TIMESTAMP_PARAM: &str = "timestamp";

/// Build the `"<source>:<tag>"` key.
#[must_use]
pub fn event_key(source: &str, tag: &str) -> String {
    format!("{source}:{tag}")
}

/// Encode `key` and `params` into the payload string.
pub fn encode_event(key: &str, params: &EventParams) -> Result<String, EventsError> {
    let inner: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let mut outer = Map::new();
    outer.insert(key.to_string(), Value::Object(inner));

    serde_json::to_string(&Value::Object(outer))
        .map_err(|e| EventsError::MalformedPayload(e.to_string()))
}

/// Split a payload string back into its key and parameters.
///
/// # Errors
///
/// `EventsError::MalformedPayload` unless the payload is an object with
/// exactly one key whose value is an object of strings.
pub fn parse_event(data: &str) -> Result<(String, EventParams), EventsError> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| EventsError::MalformedPayload(e.to_string()))?;

    let Value::Object(outer) = value else {
        return Err(EventsError::MalformedPayload("not an object".into()));
    };
    if outer.len() != 1 {
        return Err(EventsError::MalformedPayload(format!(
            "expected one key, found {}",
            outer.len()
        )));
    }

    let Some((key, inner)) = outer.into_iter().next() else {
        return Err(EventsError::MalformedPayload("empty object".into()));
    };
    let Value::Object(inner) = inner else {
        return Err(EventsError::MalformedPayload(format!("params of {key} not an object")));
    };

    let mut params = EventParams::new();
    for (k, v) in inner {
        match v {
            Value::String(s) => {
                params.insert(k, s);
            }
            other => {
                return Err(EventsError::MalformedPayload(format!(
                    "param {k} is not a string: {other}"
                )))
            }
        }
    }

    Ok((key, params))
}

/// Format a UTC time the way injected timestamps look on the wire.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Current time in the injected timestamp format.
#[must_use]
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}
