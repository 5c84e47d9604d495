//! HTTP Error Responses
//!
//! Every failure leaves the bridge as `{"status":"error","message":...}`
//! with an HTTP status chosen from the error kind. Messages describe what
//! went wrong for the caller and never carry internal state.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::ports::OrderError;
use crate::domain::translator::ValidationError;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Always `"error"`.
    pub status: &'static str,
    /// Human-readable description.
    pub message: String,
    /// Offending payload field, for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

/// API error type mapped onto an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field: None,
        }
    }

    /// Missing or wrong webhook token.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: error.to_string(),
            field: Some(error.field().as_str()),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::NotReady { state } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("broker session not ready ({state})"),
            ),
            OrderError::BrokerUnavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "broker connection lost before the order was confirmed",
            ),
            OrderError::Timeout(timeout) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                format!("no broker confirmation within {}s", timeout.as_secs_f64()),
            ),
            OrderError::Rejected(rejection) => Self::new(
                StatusCode::BAD_GATEWAY,
                format!("order rejected by broker: {rejection}"),
            ),
            OrderError::DuplicateRequest(_) => Self::internal("internal error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            message: self.message,
            field: self.field,
        };
        (self.status, Json(body)).into_response()
    }
}
