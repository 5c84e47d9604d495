//! HTTP Interface
//!
//! Axum router serving the webhook and the health endpoints on one port.

mod error;
mod health;
mod server;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};

use crate::application::ports::OrderSession;

pub use error::{ApiError, ErrorBody};
pub use health::{BannerResponse, HealthResponse, HealthStatus, TEST_MODE_SESSION};
pub use server::{HttpServer, HttpServerError};
pub use webhook::{TokenQuery, TokenVerifier, WebhookResponse};

/// Shared state for the HTTP handlers.
pub struct AppState {
    session: Arc<dyn OrderSession>,
    verifier: TokenVerifier,
    order_timeout: Duration,
    version: &'static str,
}

impl AppState {
    /// Create handler state over `session`, guarded by `auth_token`.
    #[must_use]
    pub fn new(session: Arc<dyn OrderSession>, auth_token: &str, order_timeout: Duration) -> Self {
        Self {
            session,
            verifier: TokenVerifier::new(auth_token),
            order_timeout,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Create the Axum router with all endpoints.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::index_handler))
        .route("/webhook", post(webhook::webhook_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}
