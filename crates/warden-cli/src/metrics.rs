// Metrics module for observability
// Installs the Prometheus recorder and describes the lock counters and gauges
// emitted by the Warden crates

use std::sync::OnceLock;

use anyhow::anyhow;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder and register metric descriptions.
///
/// Later calls return the handle installed by the first one.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("Failed to install metrics recorder: {}", e))?;
    describe_metrics();
    info!("Prometheus metrics recorder initialized");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Describe every metric on the current recorder
pub fn describe_metrics() {
    // Lock handle metrics
    describe_counter!(
        "warden_lock_acquired_total",
        "Total number of locks acquired"
    );
    describe_counter!(
        "warden_lock_degraded_total",
        "Total number of acquisitions that went ahead without a lock \
         because the store was unavailable"
    );
    describe_counter!(
        "warden_lock_release_not_held_total",
        "Total number of releases that found the lock already expired or taken over"
    );

    // Critical section metrics
    describe_counter!(
        "warden_critical_section_unprotected_total",
        "Total number of critical sections that ran without holding all their locks"
    );

    // Memory store metrics
    describe_counter!(
        "warden_lock_store_grants_total",
        "Total number of leases granted by the memory lock store"
    );
    describe_gauge!("warden_lock_alive", "Current number of unexpired held locks");
}
