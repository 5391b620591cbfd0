//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Permit signing
//! - Gateway submissions
//! - Status polling and tracker outcomes

use crate::tx::OperationKind;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::time::Duration;
use tracing::warn;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "supertoken_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Permit metrics
    pub static ref PERMITS_SIGNED: CounterVec = register_counter_vec!(
        "supertoken_permits_signed_total",
        "Total permits signed, by dry-run result",
        &["chain_id", "dry_run"]
    ).unwrap();

    // Submission metrics
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "supertoken_submissions_total",
        "Total gateway submissions by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();

    // Tracker metrics
    pub static ref STATUS_POLLS: CounterVec = register_counter_vec!(
        "supertoken_status_polls_total",
        "Total status API polls by kind and result",
        &["kind", "result"]
    ).unwrap();

    pub static ref TRACKER_OUTCOMES: CounterVec = register_counter_vec!(
        "supertoken_tracker_outcomes_total",
        "Terminal tracker outcomes by kind",
        &["kind", "outcome"]
    ).unwrap();

    pub static ref COMPLETION_LATENCY: HistogramVec = register_histogram_vec!(
        "supertoken_completion_latency_seconds",
        "Time from submission to terminal tracker outcome",
        &["kind"],
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_permit_signed(chain_id: u64, dry_run_ok: bool) {
    PERMITS_SIGNED
        .with_label_values(&[
            &chain_id.to_string(),
            if dry_run_ok { "ok" } else { "rejected" },
        ])
        .inc();
}

/// `outcome` is one of sent, declined, reverted, failed
pub fn record_submission(kind: OperationKind, outcome: &str) {
    SUBMISSIONS
        .with_label_values(&[kind.as_str(), outcome])
        .inc();
}

pub fn record_poll(kind: OperationKind, ok: bool) {
    STATUS_POLLS
        .with_label_values(&[kind.as_str(), if ok { "ok" } else { "error" }])
        .inc();
}

pub fn record_tracker_outcome(kind: OperationKind, outcome: &str, elapsed: Duration) {
    TRACKER_OUTCOMES
        .with_label_values(&[kind.as_str(), outcome])
        .inc();
    COMPLETION_LATENCY
        .with_label_values(&[kind.as_str()])
        .observe(elapsed.as_secs_f64());
}
