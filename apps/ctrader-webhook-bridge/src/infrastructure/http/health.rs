//! Health Check and Metrics Endpoints
//!
//! Read-only views of the broker session for load balancers, container
//! orchestrators and monitoring.
//!
//! # Endpoints
//!
//! - `GET /` - Service banner
//! - `GET /health` - JSON session status, always 200
//! - `GET /healthz` - Liveness check (simple OK)
//! - `GET /readyz` - Readiness check, 200 only when orders can be placed
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use super::AppState;
use crate::domain::session::{SessionState, SessionStatus};
use crate::infrastructure::metrics::get_metrics_handle;

/// Session label reported by the offline stub session.
pub const TEST_MODE_SESSION: &str = "test-mode";

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `degraded` once the broker refused the credentials for good.
    pub status: HealthStatus,
    /// Session state, or `test-mode`.
    pub session: String,
    /// Consecutive failed connection attempts.
    pub retry_count: u32,
    /// Most recent session failure.
    pub last_error: Option<String>,
    /// Bridge version.
    pub version: &'static str,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is running; orders may still be refused while reconnecting.
    Ok,
    /// Session gave up; a restart with new credentials is needed.
    Degraded,
}

impl HealthResponse {
    /// Build the response for a session snapshot.
    #[must_use]
    pub fn from_status(status: &SessionStatus, version: &'static str) -> Self {
        let health = if status.state == SessionState::Degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };

        Self {
            status: health,
            session: session_label(status),
            retry_count: status.retry_count,
            last_error: status.last_error.clone(),
            version,
        }
    }
}

/// Service banner served at `/`.
#[derive(Debug, Clone, Serialize)]
pub struct BannerResponse {
    /// Service description.
    pub message: &'static str,
    /// Always `running`.
    pub status: &'static str,
    /// Session state, or `test-mode`.
    pub session: String,
}

fn session_label(status: &SessionStatus) -> String {
    if status.test_mode {
        TEST_MODE_SESSION.to_string()
    } else {
        status.state.as_str().to_string()
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

pub(super) async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(BannerResponse {
        message: "TradingView to cTrader Webhook Bridge",
        status: "running",
        session: session_label(&state.session.status()),
    })
}

pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse::from_status(&state.session.status(), state.version);
    (StatusCode::OK, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.session.status().is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
