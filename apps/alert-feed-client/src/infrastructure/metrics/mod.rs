//! Prometheus Metrics Module
//!
//! Exposes client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames, decode failures, stale-session discards
//! - **Alerts**: alerts dispatched by type, handler failures
//! - **Connection**: lifecycle state, session errors, reconnects scheduled
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port when it is
//! enabled. Without an installed recorder every call here is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::alert::AlertType;
use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns [`BuildError`] if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "alert_feed_frames_received_total",
        "Total topic frames received from the feed"
    );
    describe_counter!(
        "alert_feed_decode_errors_total",
        "Total frames dropped because the payload could not be decoded"
    );
    describe_counter!(
        "alert_feed_stale_frames_total",
        "Total frames discarded because their session was superseded"
    );
    describe_counter!(
        "alert_feed_alerts_dispatched_total",
        "Total alerts dispatched to the handler set"
    );
    describe_counter!(
        "alert_feed_handler_failures_total",
        "Total handler invocations that failed or panicked"
    );
    describe_counter!(
        "alert_feed_session_errors_total",
        "Total session failures by kind"
    );
    describe_counter!(
        "alert_feed_reconnects_total",
        "Total reconnect tasks scheduled"
    );
    describe_gauge!(
        "alert_feed_connection_state",
        "1 for the current connection state, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const ALL_STATES: [ConnectionState; 5] = [
    ConnectionState::Disconnected,
    ConnectionState::Connecting,
    ConnectionState::Connected,
    ConnectionState::ReconnectPending,
    ConnectionState::ShuttingDown,
];

/// Record an inbound topic frame.
pub fn record_frame_received() {
    counter!("alert_feed_frames_received_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error() {
    counter!("alert_feed_decode_errors_total").increment(1);
}

/// Record a frame discarded from a superseded session.
pub fn record_stale_frame() {
    counter!("alert_feed_stale_frames_total").increment(1);
}

/// Record an alert dispatched to the handler set.
pub fn record_alert_dispatched(alert_type: AlertType) {
    counter!(
        "alert_feed_alerts_dispatched_total",
        "alert_type" => alert_type.as_str()
    )
    .increment(1);
}

/// Record a failed handler invocation.
pub fn record_handler_failure() {
    counter!("alert_feed_handler_failures_total").increment(1);
}

/// Record a session failure.
pub fn record_session_error(kind: &'static str) {
    counter!("alert_feed_session_errors_total", "kind" => kind).increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect_scheduled() {
    counter!("alert_feed_reconnects_total").increment(1);
}

/// Publish the current connection state as a one-hot gauge.
pub fn set_connection_state(current: ConnectionState) {
    for state in ALL_STATES {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("alert_feed_connection_state", "state" => state.as_str()).set(value);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_are_unique() {
        let labels: std::collections::HashSet<_> =
            ALL_STATES.iter().map(|s| s.as_str()).collect();
        assert_eq!(labels.len(), ALL_STATES.len());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_alert_dispatched(AlertType::StartingNow);
        record_session_error("transport");
        set_connection_state(ConnectionState::Connected);
    }
}
