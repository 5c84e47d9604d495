//! Webhook Endpoint
//!
//! `POST /webhook?token=...` turns one alert into one market order:
//!
//! 1. Check the `token` query parameter (401 on mismatch, body untouched)
//! 2. Parse the body as a JSON object whatever the Content-Type (400)
//! 3. Validate and translate the payload (400 with the offending field)
//! 4. Submit to the session and wait for the broker (503/504/502)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AppState;
use super::error::ApiError;
use crate::domain::order::{ExecutionStatus, OrderAck, RequestId};
use crate::domain::translator::{WebhookPayload, translate};
use crate::infrastructure::metrics;

// =============================================================================
// Token Verification
// =============================================================================

/// Constant-time check of the shared webhook secret.
///
/// Both sides are hashed first so the comparison does not leak the length
/// of the configured token.
#[derive(Clone)]
pub struct TokenVerifier {
    expected: [u8; 32],
}

impl TokenVerifier {
    /// Create a verifier for `token`.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            expected: digest(token),
        }
    }

    /// Whether `candidate` matches the configured token.
    #[must_use]
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        candidate.is_some_and(|candidate| {
            bool::from(digest(candidate).as_slice().ct_eq(self.expected.as_slice()))
        })
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("expected", &"[REDACTED]")
            .finish()
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query string of the webhook URL.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Shared secret.
    #[serde(default)]
    pub token: Option<String>,
}

/// Successful webhook response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Broker order id.
    pub order_id: i64,
    /// Execution status reported by the broker.
    pub execution_status: ExecutionStatus,
    /// Correlation id of the submission.
    pub request_id: RequestId,
    /// Human-readable summary.
    pub message: String,
}

impl From<OrderAck> for WebhookResponse {
    fn from(ack: OrderAck) -> Self {
        Self {
            status: "ok",
            order_id: ack.order_id,
            execution_status: ack.execution_status,
            message: format!("order {} {}", ack.order_id, ack.execution_status.as_str()),
            request_id: ack.request_id,
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// `POST /webhook`
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TokenQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let token = query.ok().and_then(|Query(query)| query.token);

    let response = match process(&state, token.as_deref(), &body).await {
        Ok(ack) => (StatusCode::OK, Json(WebhookResponse::from(ack))).into_response(),
        Err(error) => {
            tracing::warn!(
                status = error.status().as_u16(),
                message = %error.message(),
                "Webhook refused"
            );
            error.into_response()
        }
    };

    metrics::record_webhook_request(response.status().as_u16(), started.elapsed());
    response
}

async fn process(state: &AppState, token: Option<&str>, body: &[u8]) -> Result<OrderAck, ApiError> {
    if !state.verifier.verify(token) {
        return Err(ApiError::unauthorized());
    }

    let payload = parse_payload(body)?;
    let order = translate(&payload)?;
    tracing::info!(
        symbol_id = order.symbol_id(),
        side = %order.side(),
        volume = %order.volume(),
        "Webhook accepted, submitting order"
    );

    let ack = state
        .session
        .submit_order(order, state.order_timeout)
        .await?;
    tracing::info!(
        request_id = %ack.request_id,
        order_id = ack.order_id,
        execution_status = ack.execution_status.as_str(),
        "Order confirmed by broker"
    );
    Ok(ack)
}

fn parse_payload(body: &[u8]) -> Result<WebhookPayload, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("request body is not valid JSON"))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("request body must be a JSON object"));
    }
    serde_json::from_value(value)
        .map_err(|_| ApiError::bad_request("request body must be a JSON object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockOrderSession, OrderError};
    use crate::domain::order::BrokerRejection;
    use crate::domain::session::SessionState;
    use crate::infrastructure::http::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret";

    fn app(session: MockOrderSession) -> axum::Router {
        create_router(Arc::new(AppState::new(
            Arc::new(session),
            TOKEN,
            Duration::from_secs(1),
        )))
    }

    fn webhook(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "text/plain")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const VALID: &str = r#"{"symbolId":1,"tradeSide":"BUY","volume":0.1}"#;

    #[test]
    fn verifier_matches_exact_token_only() {
        let verifier = TokenVerifier::new(TOKEN);
        assert!(verifier.verify(Some(TOKEN)));
        assert!(!verifier.verify(Some("s3cre")));
        assert!(!verifier.verify(Some("")));
        assert!(!verifier.verify(None));
    }

    #[test]
    fn verifier_debug_is_redacted() {
        let output = format!("{:?}", TokenVerifier::new(TOKEN));
        assert!(!output.contains(TOKEN));
    }

    #[tokio::test]
    async fn valid_webhook_returns_confirmation() {
        let mut session = MockOrderSession::new();
        session
            .expect_submit_order()
            .withf(|order, timeout| {
                order.symbol_id() == 1
                    && order.volume() == dec!(0.1)
                    && *timeout == Duration::from_secs(1)
            })
            .times(1)
            .returning(|_, _| {
                Ok(OrderAck::new(
                    RequestId::from("req-1"),
                    555,
                    ExecutionStatus::Filled,
                ))
            });

        let response = app(session)
            .oneshot(webhook(&format!("/webhook?token={TOKEN}"), VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["orderId"], 555);
        assert_eq!(body["executionStatus"], "filled");
        assert_eq!(body["requestId"], "req-1");
    }

    #[tokio::test]
    async fn bad_token_is_rejected_before_parsing() {
        let mut session = MockOrderSession::new();
        session.expect_submit_order().times(0);

        for uri in ["/webhook", "/webhook?token=wrong", "/webhook?token="] {
            let response = app(MockOrderSession::new())
                .oneshot(webhook(uri, "not json at all"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json_body(response).await["status"], "error");
        }

        let response = app(session)
            .oneshot(webhook("/webhook?token=wrong", VALID))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        for body in ["{", "[1,2]", "\"BUY\"", ""] {
            let mut session = MockOrderSession::new();
            session.expect_submit_order().times(0);
            let response = app(session)
                .oneshot(webhook(&format!("/webhook?token={TOKEN}"), body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn invalid_field_is_reported() {
        let mut session = MockOrderSession::new();
        session.expect_submit_order().times(0);

        let response = app(session)
            .oneshot(webhook(
                &format!("/webhook?token={TOKEN}"),
                r#"{"symbolId":1,"tradeSide":"HOLD","volume":1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["field"], "tradeSide");
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn session_errors_map_to_gateway_statuses() {
        let cases = [
            (
                OrderError::NotReady {
                    state: SessionState::Connecting,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                OrderError::Timeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                OrderError::Rejected(BrokerRejection::new("MARKET_CLOSED", "closed")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                OrderError::BrokerUnavailable("lost".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            let mut session = MockOrderSession::new();
            session
                .expect_submit_order()
                .times(1)
                .returning(move |_, _| Err(error.clone()));

            let response = app(session)
                .oneshot(webhook(&format!("/webhook?token={TOKEN}"), VALID))
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }
}
