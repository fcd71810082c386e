//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Event publishing
//! - Stream connections and reads
//! - Replay outcomes and latency
//! - Runner state
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `event_replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! Every metric carries the entity `prefix` as a label so several services
//! in one process stay distinguishable.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Publish
// =============================================================================

/// Record a publish attempt outcome.
pub fn record_event_published(prefix: &str, event_type: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "event_replication_events_published_total",
        "prefix" => prefix.to_string(),
        "event_type" => event_type.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record publish round-trip latency (including retries).
pub fn record_publish_latency(prefix: &str, duration: Duration) {
    histogram!("event_replication_publish_latency_seconds", "prefix" => prefix.to_string())
        .record(duration.as_secs_f64());
}

/// Record a retried HTTP request.
pub fn record_http_retry(operation: &str) {
    counter!("event_replication_http_retries_total", "operation" => operation.to_string()).increment(1);
}

// =============================================================================
// Stream
// =============================================================================

/// Record a stream connection attempt.
pub fn record_stream_connection(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("event_replication_stream_connections_total", "status" => status).increment(1);
}

/// Record an event received off the stream.
pub fn record_event_received(event_type: &str) {
    counter!("event_replication_events_received_total", "event_type" => event_type.to_string())
        .increment(1);
}

/// Record bytes read from the stream body.
pub fn record_stream_bytes(bytes: usize) {
    counter!("event_replication_stream_bytes_total").increment(bytes as u64);
}

/// Record a reconnect of the runner.
pub fn record_reconnect(prefix: &str) {
    counter!("event_replication_reconnects_total", "prefix" => prefix.to_string()).increment(1);
}

// =============================================================================
// Replay
// =============================================================================

/// Record a replay outcome (`applied`, `skipped_existing`, `skipped_missing`, `ignored`).
pub fn record_replay_outcome(prefix: &str, outcome: &str) {
    counter!(
        "event_replication_replay_total",
        "prefix" => prefix.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record replay latency.
pub fn record_replay_latency(prefix: &str, duration: Duration) {
    histogram!("event_replication_replay_latency_seconds", "prefix" => prefix.to_string())
        .record(duration.as_secs_f64());
}

/// Record an event dropped by the runner after an error.
pub fn record_event_dropped(prefix: &str, reason: &str) {
    counter!(
        "event_replication_events_dropped_total",
        "prefix" => prefix.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record an error by type.
pub fn record_error(prefix: &str, error_type: &str) {
    counter!(
        "event_replication_errors_total",
        "prefix" => prefix.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

// =============================================================================
// Runner
// =============================================================================

/// Gauge for runner state.
pub fn set_runner_state(prefix: &str, state: &str) {
    // Encode state as numeric for alerting
    let value = match state {
        "Idle" => 0.0,
        "Connecting" => 1.0,
        "Streaming" => 2.0,
        "Backoff" => 3.0,
        "Stopped" => 4.0,
        "Failed" => 5.0,
        _ => -1.0,
    };
    gauge!("event_replication_runner_state", "prefix" => prefix.to_string()).set(value);
}
