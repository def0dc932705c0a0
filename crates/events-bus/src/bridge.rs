//! # JSON Bridge
//!
//! Entry points for callers in other languages: arguments arrive as JSON
//! strings, handles leave as raw integers (`0` is null), and results are
//! integer return codes or JSON text.
//!
//! | Call | Arguments |
//! |------|-----------|
//! | `init_publisher_wrap` | `{"source": "..."}` |
//! | `publish_wrap` | `{"tag": "...", "params": {"k": "v"}}` |
//! | `init_subscriber_wrap` | `{"use_cache": bool, "recv_timeout": int, "sources": [..]}` |
//!
//! Keys with the wrong JSON type are ignored, as are non-string params.

use crate::registry::{EventHandle, EventsRegistry};
use crate::subscriber::SubscriberOptions;
use events_types::{EventParams, EventsError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const ARGS_SOURCE: &str = "source";
const ARGS_TAG: &str = "tag";
const ARGS_PARAMS: &str = "params";
const ARGS_USE_CACHE: &str = "use_cache";
const ARGS_RECV_TIMEOUT: &str = "recv_timeout";
const ARGS_SOURCES: &str = "sources";

/// JSON-argument front end over an [`EventsRegistry`].
#[derive(Clone)]
pub struct EventsBridge {
    registry: Arc<EventsRegistry>,
}

impl EventsBridge {
    /// Wrap a registry.
    #[must_use]
    pub fn new(registry: Arc<EventsRegistry>) -> Self {
        Self { registry }
    }

    /// Create or look up a publisher. Returns `0` on failure.
    pub async fn init_publisher_wrap(&self, args: Option<&str>) -> u64 {
        debug!(args = ?args, "init_publisher_wrap");
        let Some(data) = args.and_then(parse_object) else {
            return 0;
        };

        let source = data
            .get(ARGS_SOURCE)
            .and_then(Value::as_str)
            .unwrap_or_default();

        match self.registry.init_publisher(source).await {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                warn!(source, error = %e, "Failed to init publisher");
                0
            }
        }
    }

    /// Drop a publisher.
    pub async fn deinit_publisher_wrap(&self, handle: u64) {
        if let Some(handle) = EventHandle::from_raw(handle) {
            self.registry.deinit_publisher(handle).await;
        }
    }

    /// Publish. Returns `0` on success, negative on failure.
    pub async fn publish_wrap(&self, handle: u64, args: Option<&str>) -> i32 {
        debug!(handle, args = ?args, "publish_wrap");
        let Some(handle) = EventHandle::from_raw(handle) else {
            return EventsError::InvalidHandle.rc();
        };
        let Some(data) = args.and_then(parse_object) else {
            return EventsError::MalformedPayload("publish args".to_string()).rc();
        };

        let tag = data.get(ARGS_TAG).and_then(Value::as_str).unwrap_or_default();
        let params: EventParams = data
            .get(ARGS_PARAMS)
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        match self.registry.publish(handle, tag, Some(&params)).await {
            Ok(()) => 0,
            Err(e) => e.rc(),
        }
    }

    /// Create or look up the subscriber. Returns `0` on failure.
    ///
    /// Defaults differ from [`SubscriberOptions::default`]: bridged callers
    /// use the cache unless told otherwise.
    pub async fn init_subscriber_wrap(&self, args: Option<&str>) -> u64 {
        debug!(args = ?args, "init_subscriber_wrap");
        let mut options = SubscriberOptions {
            use_cache: true,
            ..SubscriberOptions::default()
        };

        if let Some(args) = args {
            let Some(data) = parse_object(args) else {
                return 0;
            };
            if let Some(use_cache) = data.get(ARGS_USE_CACHE).and_then(Value::as_bool) {
                options.use_cache = use_cache;
            }
            if let Some(timeout) = data
                .get(ARGS_RECV_TIMEOUT)
                .and_then(Value::as_i64)
                .and_then(|t| i32::try_from(t).ok())
            {
                options.recv_timeout_ms = timeout;
            }
            if let Some(sources) = data.get(ARGS_SOURCES).and_then(Value::as_array) {
                options.sources = sources
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
            }
        }

        match self.registry.init_subscriber(&options).await {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                warn!(error = %e, "Failed to init subscriber");
                0
            }
        }
    }

    /// Shut down the subscriber.
    pub async fn deinit_subscriber_wrap(&self, handle: u64) {
        debug!(handle, "deinit_subscriber_wrap");
        if let Some(handle) = EventHandle::from_raw(handle) {
            self.registry.deinit_subscriber(handle).await;
        }
    }

    /// Receive one event as JSON, truncated to `max_len` bytes.
    ///
    /// The return code is the full JSON length on success, `0` on timeout,
    /// and negative on failure.
    pub async fn receive_wrap(&self, handle: u64, max_len: usize) -> (i32, String) {
        let Some(handle) = EventHandle::from_raw(handle) else {
            return (EventsError::InvalidHandle.rc(), String::new());
        };

        let op = self.registry.receive(handle).await;
        match op.rc {
            0 => match op.to_json() {
                Ok(json) => {
                    let rc = i32::try_from(json.len()).unwrap_or(i32::MAX);
                    (rc, truncate_bytes(&json, max_len).to_string())
                }
                Err(e) => (e.rc(), String::new()),
            },
            rc if rc > 0 => (0, String::new()),
            rc => (rc, String::new()),
        }
    }
}

fn parse_object(args: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(args) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!("Bridge args are not a JSON object");
            None
        }
        Err(e) => {
            warn!(error = %e, "Bridge args are not valid JSON");
            None
        }
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
