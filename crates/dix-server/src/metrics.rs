//! Prometheus metrics for the catalogue service
//!
//! Labels carry the operation and outcome only, never keys or values.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::error::{Result, ServerError};

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_CLIENT_ERROR: &str = "client_error";

pub fn record_cas_request(op: &str, outcome: &str, duration: Duration) {
    counter!(
        "dix_cas_requests_total",
        "op" => op.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("dix_cas_request_duration_seconds", "op" => op.to_string())
        .record(duration.as_secs_f64());
}

/// Items in a request that came back with an application error
pub fn record_item_errors(op: &str, errors: usize) {
    if errors > 0 {
        counter!("dix_cas_item_errors_total", "op" => op.to_string()).increment(errors as u64);
    }
}

pub fn set_store_size(catalogues: usize, records: usize) {
    gauge!("dix_catalogues").set(catalogues as f64);
    gauge!("dix_records").set(records as f64);
}

pub fn init_prometheus_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Internal(format!("Failed to install Prometheus recorder: {}", e)))
}
