//! Metrics definitions for the classroom session core.
//!
//! All metrics follow Prometheus naming conventions:
//! - `classroom_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by the enums that produce them (`SessionPhase`,
//! `EventKind`, toggle features, transport operations). Never label with
//! session ids, participant ids or message content.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a lifecycle phase transition.
///
/// Metric: `classroom_phase_transitions_total`
/// Labels: `phase`
pub fn record_phase_transition(phase: &str) {
    counter!("classroom_phase_transitions_total", "phase" => phase.to_string()).increment(1);
}

/// Record an event received from the transport.
///
/// Metric: `classroom_channel_events_total`
/// Labels: `kind`
pub fn record_channel_event(kind: &str) {
    counter!("classroom_channel_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record an outbound broadcast.
///
/// Metric: `classroom_publish_total`
/// Labels: `kind`, `status` (success, error)
pub fn record_publish(kind: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "classroom_publish_total",
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a re-delivered event that a manager ignored.
///
/// Metric: `classroom_duplicate_events_total`
/// Labels: `kind`
pub fn record_duplicate_event(kind: &str) {
    counter!("classroom_duplicate_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record a recording or screen-share toggle.
///
/// Metric: `classroom_toggle_total`
/// Labels: `feature` (recording, screen_share), `status` (success, error, busy)
pub fn record_toggle(feature: &str, status: &str) {
    counter!(
        "classroom_toggle_total",
        "feature" => feature.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set the current hand-raise queue length.
///
/// Metric: `classroom_hand_queue_depth`
/// Labels: none
pub fn set_hand_queue_depth(depth: usize) {
    // usize to f64 conversion is safe for classroom-sized queues
    #[allow(clippy::cast_precision_loss)]
    gauge!("classroom_hand_queue_depth").set(depth as f64);
}

/// Record transport call latency.
///
/// Metric: `classroom_transport_latency_seconds`
/// Labels: `operation`
pub fn record_transport_latency(operation: &str, duration: Duration) {
    histogram!(
        "classroom_transport_latency_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}
