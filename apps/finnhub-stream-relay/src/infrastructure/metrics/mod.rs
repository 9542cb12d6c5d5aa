//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: counts of ticks received and updates published
//! - **Sinks**: cache and publish failure counts
//! - **Pool**: evictions and rejected admissions
//! - **Connection**: upstream reconnect attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "relay_ticks_received_total",
        "Trade entries received from the upstream feed"
    );
    describe_counter!(
        "relay_updates_published_total",
        "Normalized price updates published downstream"
    );
    describe_counter!(
        "relay_cache_errors_total",
        "Failed latest-price cache writes"
    );
    describe_counter!(
        "relay_publish_errors_total",
        "Failed topic publishes"
    );
    describe_counter!(
        "relay_pool_evictions_total",
        "Idle symbols evicted from the upstream subscription pool"
    );
    describe_counter!(
        "relay_pool_rejections_total",
        "Subscriptions rejected because the pool was full of viewed symbols"
    );
    describe_counter!(
        "relay_feed_reconnects_total",
        "Upstream feed reconnection attempts"
    );
}

/// Record one trade entry received from the feed.
pub fn record_tick_received() {
    counter!("relay_ticks_received_total").increment(1);
}

/// Record one update published downstream.
pub fn record_update_published() {
    counter!("relay_updates_published_total").increment(1);
}

/// Record a failed cache write.
pub fn record_cache_error() {
    counter!("relay_cache_errors_total").increment(1);
}

/// Record a failed topic publish.
pub fn record_publish_error() {
    counter!("relay_publish_errors_total").increment(1);
}

/// Record an eviction from the subscription pool.
pub fn record_pool_eviction() {
    counter!("relay_pool_evictions_total").increment(1);
}

/// Record a rejected pool admission.
pub fn record_pool_rejection() {
    counter!("relay_pool_rejections_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_feed_reconnect() {
    counter!("relay_feed_reconnects_total").increment(1);
}
