//! Prometheus metrics for the worthboard server.
//!
//! Provides counters and histograms for monitoring updates, oracle calls,
//! store conflicts, cache writes and leaderboard queries.

use eyre::{Result, WrapErr};
use metrics::{counter, histogram};

/// Record a completed update.
pub fn record_update(outcome: &str, duration_ms: u64) {
    counter!("updates_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("update_duration_ms").record(duration_ms as f64);
}

/// Record an oracle balance lookup.
pub fn record_oracle_call(success: bool, duration_ms: u64) {
    counter!("oracle_calls_total", "success" => success.to_string()).increment(1);
    histogram!("oracle_call_duration_ms").record(duration_ms as f64);
}

/// Record a lost compare-and-swap on the record store.
pub fn record_store_conflict() {
    counter!("store_conflicts_total").increment(1);
}

/// Record a score cache write.
pub fn record_cache_write(success: bool) {
    counter!("cache_writes_total", "success" => success.to_string()).increment(1);
}

/// Record a leaderboard query.
pub fn record_leaderboard(entries: usize) {
    counter!("leaderboard_requests_total").increment(1);
    histogram!("leaderboard_size").record(entries as f64);
}

/// Install the Prometheus metrics exporter and return the recorder handle.
pub fn install_prometheus_recorder() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("failed to install Prometheus recorder")
}
