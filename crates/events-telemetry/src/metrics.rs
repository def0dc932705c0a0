//! Prometheus counters for the event bus.
//!
//! All metrics follow the naming convention: `events_<what>_total`.
//! Counters work whether or not [`register_metrics`] has been called; the
//! registry only controls what [`encode_metrics`] exposes.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Registry for event bus metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PUBLISHER METRICS
    // =========================================================================

    /// Events handed to the transport, by source
    pub static ref EVENTS_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("events_published_total", "Events published by source"),
        &["source"]
    ).expect("metric creation failed");

    /// Publish attempts rejected by the transport, by source
    pub static ref EVENTS_PUBLISH_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("events_publish_failures_total", "Publish failures by source"),
        &["source"]
    ).expect("metric creation failed");

    // =========================================================================
    // SUBSCRIBER METRICS
    // =========================================================================

    /// Events delivered to the subscriber's caller
    pub static ref EVENTS_RECEIVED: IntCounter = IntCounter::new(
        "events_received_total",
        "Events delivered to the consumer"
    ).expect("metric creation failed");

    /// Events detected as lost through sequence gaps
    pub static ref EVENTS_MISSED: IntCounter = IntCounter::new(
        "events_missed_total",
        "Events detected as missed from sequence gaps"
    ).expect("metric creation failed");

    /// Records dropped as already delivered
    pub static ref EVENTS_DUPLICATES: IntCounter = IntCounter::new(
        "events_duplicates_total",
        "Duplicate records discarded"
    ).expect("metric creation failed");

    /// Control records consumed internally
    pub static ref EVENTS_CONTROL: IntCounter = IntCounter::new(
        "events_control_total",
        "Control records processed"
    ).expect("metric creation failed");

    /// Records replayed from the cache service
    pub static ref EVENTS_CACHE_REPLAYED: IntCounter = IntCounter::new(
        "events_cache_replayed_total",
        "Records read back from the cache service"
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`].
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_PUBLISH_FAILURES.clone()),
        Box::new(EVENTS_RECEIVED.clone()),
        Box::new(EVENTS_MISSED.clone()),
        Box::new(EVENTS_DUPLICATES.clone()),
        Box::new(EVENTS_CONTROL.clone()),
        Box::new(EVENTS_CACHE_REPLAYED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
