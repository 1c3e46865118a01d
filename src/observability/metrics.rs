//! Metrics collection and exposition.
//!
//! # Metrics
//! - `configmap_reloader_reconciliations_total` (counter): by outcome
//! - `configmap_reloader_files_written` (gauge): files materialized by the last sync
//! - `configmap_reloader_reload_attempts_total` (counter): by trigger, outcome
//! - `configmap_reloader_child_exits_total` (counter): by kind
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reconciliation(outcome: &'static str) {
    metrics::counter!("configmap_reloader_reconciliations_total", "outcome" => outcome).increment(1);
}

pub fn record_files_written(count: usize) {
    metrics::gauge!("configmap_reloader_files_written").set(count as f64);
}

pub fn record_reload(trigger: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "configmap_reloader_reload_attempts_total",
        "trigger" => trigger,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_child_exit(kind: &'static str) {
    metrics::counter!("configmap_reloader_child_exits_total", "kind" => kind).increment(1);
}
