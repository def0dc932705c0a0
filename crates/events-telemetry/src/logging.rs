//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry whose level filter sits behind a
//! reload layer, so a daemon can change its log priority at runtime.

use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::{TelemetryConfig, TelemetryError};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    let registry = tracing_subscriber::registry().with(filter_layer);

    let result = match (config.console_output, config.json_logs) {
        (false, _) => registry.try_init(),
        (true, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        (true, false) => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    // First successful init wins; try_init above already rejects a second one.
    let _ = FILTER_HANDLE.set(handle);

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

/// Replace the active level filter, e.g. `"debug"` or `"events_bus=trace"`.
pub fn set_log_level(directive: &str) -> Result<(), TelemetryError> {
    let handle = FILTER_HANDLE
        .get()
        .ok_or_else(|| TelemetryError::Config("logging not initialized".to_string()))?;
    let filter =
        EnvFilter::try_new(directive).map_err(|e| TelemetryError::Config(e.to_string()))?;
    handle
        .reload(filter)
        .map_err(|e| TelemetryError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Global subscriber state is shared across the test binary, so init and
    // reload are exercised together in one test.
    #[test]
    fn test_init_then_reload() {
        let config = TelemetryConfig {
            console_output: false,
            ..TelemetryConfig::default()
        };
        init_logging(&config).unwrap();
        assert!(init_logging(&config).is_err());

        set_log_level("debug").unwrap();
        assert!(set_log_level("events_bus=notalevel").is_err());
    }
}
