//! Metrics definitions for the Roll Call service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: a handful of fixed strings per metric (accepted, invalid_code, ...)
//!
//! Participant and session identifiers are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Persistence is one SQLite transaction per close
        .set_buckets_for_metric(
            Matcher::Prefix("rc_persistence".to_string()),
            &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000],
        )
        .map_err(|e| format!("Failed to set persistence buckets: {e}"))?
        // Entries per finalized session
        .set_buckets_for_metric(
            Matcher::Full("rc_session_size".to_string()),
            &[0.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
        )
        .map_err(|e| format!("Failed to set session size buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Set whether a session is currently active.
///
/// Metric: `rc_sessions_active`
pub fn set_session_active(active: bool) {
    gauge!("rc_sessions_active").set(if active { 1.0 } else { 0.0 });
}

/// Record the number of entries in a finalized session.
///
/// Metric: `rc_session_size`
pub fn record_session_size(entries: usize) {
    // usize to f64 conversion is safe for realistic class sizes
    #[allow(clippy::cast_precision_loss)]
    histogram!("rc_session_size").record(entries as f64);
}

/// Record a submission outcome.
///
/// Metric: `rc_submissions_total`
/// Labels: `outcome` (accepted, invalid_code, no_session, wrong_channel)
pub fn record_submission(outcome: &'static str) {
    counter!("rc_submissions_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Rotation & Display Metrics
// ============================================================================

/// Record a rotation tick outcome.
///
/// Metric: `rc_code_rotations_total`
/// Labels: `outcome` (published, dropped, generator_error)
pub fn record_rotation(outcome: &'static str) {
    counter!("rc_code_rotations_total", "outcome" => outcome).increment(1);
}

/// Record a display surface call outcome.
///
/// Metric: `rc_display_updates_total`
/// Labels: `outcome` (success, not_found, unavailable)
pub fn record_display_update(outcome: &'static str) {
    counter!("rc_display_updates_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Persistence Metrics
// ============================================================================

/// Record a persistence hand-off.
///
/// Metrics:
/// - `rc_persistence_total` (labels: `outcome` = success | error)
/// - `rc_persistence_duration_seconds`
/// - `rc_records_saved_total` (on success)
pub fn record_persistence(outcome: &'static str, saved: u64, duration: Duration) {
    counter!("rc_persistence_total", "outcome" => outcome).increment(1);
    histogram!("rc_persistence_duration_seconds").record(duration.as_secs_f64());
    if saved > 0 {
        counter!("rc_records_saved_total").increment(saved);
    }
}
