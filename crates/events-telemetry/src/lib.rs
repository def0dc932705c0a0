//! # Events Telemetry
//!
//! Logging and metrics for event bus daemons.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use events_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_service("orchagent");
//! init_logging(&config)?;
//! register_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EVENTS_SERVICE_NAME` | `events` | Service name in log lines |
//! | `EVENTS_LOG_LEVEL` | `info` | Log level filter |
//! | `EVENTS_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `EVENTS_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, set_log_level};
pub use metrics::{
    encode_metrics, register_metrics, EVENTS_CACHE_REPLAYED, EVENTS_CONTROL, EVENTS_DUPLICATES,
    EVENTS_MISSED, EVENTS_PUBLISHED, EVENTS_PUBLISH_FAILURES, EVENTS_RECEIVED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
