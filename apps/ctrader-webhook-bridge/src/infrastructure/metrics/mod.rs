//! Prometheus Metrics Module
//!
//! Exposes bridge metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Webhooks**: Requests received by HTTP outcome
//! - **Orders**: Submissions, outcomes, pending count and ack latency
//! - **Session**: Current state, connect attempts, reconnects and errors
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port. Until
//! [`init_metrics`] runs, recording functions are no-ops.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns [`BuildError`] if the global recorder cannot be installed.
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
        "bridge_webhook_requests_total",
        "Webhook requests by response status"
    );
    describe_histogram!(
        "bridge_webhook_duration_seconds",
        "Time from webhook receipt to response"
    );

    describe_counter!(
        "bridge_orders_submitted_total",
        "Orders written to the broker connection"
    );
    describe_counter!(
        "bridge_order_outcomes_total",
        "Order submissions by outcome"
    );
    describe_counter!(
        "bridge_late_responses_total",
        "Broker answers that arrived after the caller stopped waiting"
    );
    describe_gauge!("bridge_pending_orders", "Orders awaiting a broker answer");
    describe_histogram!(
        "bridge_order_ack_seconds",
        "Time from order submission to broker answer"
    );

    describe_gauge!(
        "bridge_session_state",
        "1 for the current broker session state, 0 otherwise"
    );
    describe_counter!(
        "bridge_connect_attempts_total",
        "Broker connection attempts"
    );
    describe_counter!(
        "bridge_reconnects_total",
        "Reconnects scheduled after a connection failure"
    );
    describe_counter!(
        "bridge_session_errors_total",
        "Broker session errors by kind"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for order outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Broker acknowledged the order.
    Acknowledged,
    /// Broker (or local volume check) refused the order.
    Rejected,
    /// No answer in time.
    TimedOut,
    /// Connection lost while in flight.
    Unavailable,
    /// Session was not ready.
    NotReady,
}

impl OrderOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
            Self::Unavailable => "unavailable",
            Self::NotReady => "not_ready",
        }
    }
}

const ALL_STATES: [SessionState; 6] = [
    SessionState::Disconnected,
    SessionState::Connecting,
    SessionState::Connected,
    SessionState::Authenticating,
    SessionState::Ready,
    SessionState::Degraded,
];

/// Record a webhook response.
pub fn record_webhook_request(status: u16, duration: Duration) {
    counter!(
        "bridge_webhook_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bridge_webhook_duration_seconds").record(duration.as_secs_f64());
}

/// Record an order written to the broker.
pub fn record_order_submitted() {
    counter!("bridge_orders_submitted_total").increment(1);
}

/// Record how an order submission ended.
pub fn record_order_outcome(outcome: OrderOutcome) {
    counter!(
        "bridge_order_outcomes_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a broker answer that found no pending order.
pub fn record_late_response() {
    counter!("bridge_late_responses_total").increment(1);
}

/// Update the pending order count.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_orders(count: usize) {
    gauge!("bridge_pending_orders").set(count as f64);
}

/// Record the latency of a broker answer.
pub fn record_order_latency(latency: Duration) {
    histogram!("bridge_order_ack_seconds").record(latency.as_secs_f64());
}

/// Mark `current` as the active session state.
pub fn set_session_state(current: SessionState) {
    for state in ALL_STATES {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("bridge_session_state", "state" => state.as_str()).set(value);
    }
}

/// Record a broker connection attempt.
pub fn record_connect_attempt() {
    counter!("bridge_connect_attempts_total").increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("bridge_reconnects_total").increment(1);
}

/// Record a broker session error.
pub fn record_session_error(kind: &'static str) {
    counter!("bridge_session_errors_total", "kind" => kind).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
