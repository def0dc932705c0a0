//! Event bus configuration.
//!
//! Values come from the `"events"` object of the init config file, with
//! environment overrides for the endpoints.

use crate::errors::EventsError;
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Default location of the init config file.
pub const INIT_CFG_PATH: &str = "/etc/sonic/init_cfg.json";

/// Key of the events section inside the init config file.
pub const CFG_EVENTS_KEY: &str = "events";

const ENDPOINT_SCHEMES: [&str; 3] = ["tcp://", "ipc://", "inproc://"];

/// Endpoints and limits used by publishers, subscribers and the event service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Ingress of the fan-out proxy; publishers connect here.
    pub xsub_path: String,

    /// Egress of the fan-out proxy; subscribers connect here.
    pub xpub_path: String,

    /// Event service request/reply endpoint.
    pub req_rep_path: String,

    /// Endpoint the cache service captures from.
    pub capture_path: String,

    /// Stats refresh interval of the event service.
    pub stats_upd_secs: u64,

    /// Maximum events held by the cache service.
    pub cache_max_cnt: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            xsub_path: "tcp://127.0.0.1:5570".to_string(),
            xpub_path: "tcp://127.0.0.1:5571".to_string(),
            req_rep_path: "tcp://127.0.0.1:5572".to_string(),
            capture_path: "tcp://127.0.0.1:5573".to_string(),
            stats_upd_secs: 5,
            cache_max_cnt: 6000,
        }
    }
}

impl EventsConfig {
    /// Read the `"events"` section of an init config file.
    ///
    /// A missing file yields the defaults; keys absent from the section keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// `EventsError::Config` if the file exists but cannot be read or parsed.
    pub fn from_init_cfg(path: impl AsRef<Path>) -> Result<Self, EventsError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No init config; using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| EventsError::Config(format!("{}: {e}", path.display())))?;
        let root: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| EventsError::Config(format!("{}: {e}", path.display())))?;

        match root.get(CFG_EVENTS_KEY) {
            Some(section) => serde_json::from_value(section.clone())
                .map_err(|e| EventsError::Config(format!("{CFG_EVENTS_KEY}: {e}"))),
            None => Ok(Self::default()),
        }
    }

    /// Apply endpoint overrides from the environment.
    ///
    /// - `EVENTS_XSUB_PATH`
    /// - `EVENTS_XPUB_PATH`
    /// - `EVENTS_REQ_REP_PATH`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("EVENTS_XSUB_PATH") {
            self.xsub_path = v;
        }
        if let Ok(v) = env::var("EVENTS_XPUB_PATH") {
            self.xpub_path = v;
        }
        if let Ok(v) = env::var("EVENTS_REQ_REP_PATH") {
            self.req_rep_path = v;
        }
        self
    }

    /// Check every endpoint is non-empty and uses a known scheme.
    pub fn validate(&self) -> Result<(), EventsError> {
        for (name, endpoint) in [
            ("xsub_path", &self.xsub_path),
            ("xpub_path", &self.xpub_path),
            ("req_rep_path", &self.req_rep_path),
            ("capture_path", &self.capture_path),
        ] {
            validate_endpoint(endpoint)
                .map_err(|reason| EventsError::Config(format!("{name}: {reason}")))?;
        }
        Ok(())
    }
}

/// Check a single endpoint string.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    if endpoint.is_empty() {
        return Err("empty endpoint".to_string());
    }
    let Some(scheme) = ENDPOINT_SCHEMES.iter().find(|s| endpoint.starts_with(*s)) else {
        return Err(format!("unsupported scheme in {endpoint}"));
    };
    if endpoint.len() == scheme.len() {
        return Err(format!("missing address in {endpoint}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EventsConfig::default();
        assert_eq!(config.xsub_path, "tcp://127.0.0.1:5570");
        assert_eq!(config.xpub_path, "tcp://127.0.0.1:5571");
        assert_eq!(config.cache_max_cnt, 6000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EventsConfig::from_init_cfg("/nonexistent/init_cfg.json").unwrap();
        assert_eq!(config, EventsConfig::default());
    }

    #[test]
    fn test_partial_events_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"events": {{"xsub_path": "ipc:///tmp/xsub", "cache_max_cnt": 10}}, "other": 1}}"#
        )
        .unwrap();

        let config = EventsConfig::from_init_cfg(file.path()).unwrap();
        assert_eq!(config.xsub_path, "ipc:///tmp/xsub");
        assert_eq!(config.cache_max_cnt, 10);
        assert_eq!(config.xpub_path, EventsConfig::default().xpub_path);
    }

    #[test]
    fn test_no_events_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"DEVICE_METADATA": {{}}}}"#).unwrap();
        let config = EventsConfig::from_init_cfg(file.path()).unwrap();
        assert_eq!(config, EventsConfig::default());
    }

    #[test]
    fn test_unparsable_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let result = EventsConfig::from_init_cfg(file.path());
        assert!(matches!(result, Err(EventsError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        let mut config = EventsConfig::default();
        config.xpub_path = String::new();
        assert!(matches!(config.validate(), Err(EventsError::Config(_))));

        config.xpub_path = "http://127.0.0.1:80".to_string();
        assert!(config.validate().is_err());

        config.xpub_path = "tcp://".to_string();
        assert!(config.validate().is_err());

        config.xpub_path = "inproc://egress".to_string();
        assert!(config.validate().is_ok());
    }
}
