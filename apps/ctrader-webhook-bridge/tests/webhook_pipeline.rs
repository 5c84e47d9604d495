//! Webhook Pipeline Integration Tests
//!
//! Drives the HTTP router end to end against a real session manager backed
//! by the in-memory mock broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ctrader_webhook_bridge::infrastructure::ctrader::{
    MockBrokerClient, MockBrokerControl, OrderReply,
};
use ctrader_webhook_bridge::{
    AppState, AuthConfig, BAD_VOLUME_CODE, BrokerEvent, ExecutionStatus, HostType, OrderAck,
    SessionHandle, SessionManager, SessionManagerConfig, SessionSettings, SessionState,
    TestModeSession, create_router,
};

const TOKEN: &str = "tv-secret";
const WAIT: Duration = Duration::from_secs(2);
const ORDER_TIMEOUT: Duration = Duration::from_millis(100);
const VALID: &str = r#"{"symbolId":1234,"tradeSide":"BUY","volume":0.01}"#;

struct Harness {
    app: Router,
    handle: SessionHandle,
    control: MockBrokerControl,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn settings() -> SessionSettings {
    SessionSettings {
        connect_timeout: Duration::from_millis(200),
        auth_timeout: Duration::from_millis(200),
        write_timeout: Duration::from_millis(200),
        heartbeat_interval: Duration::from_secs(1),
        heartbeat_timeout: Duration::from_secs(5),
        reconnect_delay_initial: Duration::from_millis(10),
        reconnect_delay_max: Duration::from_millis(50),
        reconnect_jitter: 0.0,
        max_auth_failures: 3,
    }
}

fn harness_with(settings: SessionSettings, script: impl FnOnce(&MockBrokerControl)) -> Harness {
    let (client, control) = MockBrokerClient::new();
    script(&control);

    let auth = AuthConfig::new(
        HostType::Demo,
        "client".to_string(),
        "secret".to_string(),
        "access".to_string(),
        42,
        TOKEN.to_string(),
    );
    let cancel = CancellationToken::new();
    let (handle, _task) = SessionManager::spawn(
        SessionManagerConfig::new("mock://demo".to_string(), auth, settings),
        client,
        cancel.clone(),
    );

    let state = AppState::new(Arc::new(handle.clone()), TOKEN, ORDER_TIMEOUT);
    Harness {
        app: create_router(Arc::new(state)),
        handle,
        control,
        cancel,
    }
}

async fn ready_harness() -> Harness {
    let harness = harness_with(settings(), |_| {});
    assert!(harness.handle.wait_for_state(SessionState::Ready, WAIT).await);
    harness
}

async fn post(app: &Router, token: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/webhook?token={token}"))
                .header("content-type", "text/plain; charset=utf-8")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn ready_session_places_order() {
    let harness = ready_harness().await;

    let (status, body) = post(&harness.app, TOKEN, VALID).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["orderId"].as_i64().is_some());
    assert_eq!(body["executionStatus"], "accepted");

    let sent = harness.control.sent_orders();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_str(), body["requestId"].as_str().unwrap());
    assert_eq!(sent[0].1.symbol_id(), 1234);
    assert_eq!(sent[0].1.volume_units(), Some(1));
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let harness = ready_harness().await;

    let (status, body) = post(&harness.app, "wrong", VALID).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert!(harness.control.sent_orders().is_empty());
}

#[tokio::test]
async fn invalid_trade_side_is_bad_request() {
    let harness = ready_harness().await;

    let (status, body) = post(
        &harness.app,
        TOKEN,
        r#"{"symbolId":1234,"tradeSide":"HOLD","volume":0.01}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "tradeSide");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("invalid tradeSide")
    );
}

#[tokio::test]
async fn disconnected_session_is_unavailable() {
    let mut settings = settings();
    settings.reconnect_delay_initial = Duration::from_secs(30);
    settings.reconnect_delay_max = Duration::from_secs(30);
    let harness = harness_with(settings, |control| control.fail_next_connects(1));
    assert!(
        harness
            .handle
            .wait_for_state(SessionState::Disconnected, WAIT)
            .await
    );

    let (status, body) = post(&harness.app, TOKEN, VALID).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert!(harness.control.sent_orders().is_empty());

    let (health_status, health) = get(&harness.app, "/health").await;
    assert_eq!(health_status, StatusCode::OK);
    assert_eq!(health["session"], "disconnected");
    assert_eq!(health["retryCount"], 1);
}

#[tokio::test]
async fn unanswered_order_times_out_and_late_ack_is_ignored() {
    let harness = harness_with(settings(), |control| {
        control.set_order_reply(OrderReply::Ignore);
    });
    assert!(harness.handle.wait_for_state(SessionState::Ready, WAIT).await);

    let (status, body) = post(&harness.app, TOKEN, VALID).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["status"], "error");
    assert!(harness.handle.pending_orders().is_empty());

    let (request_id, _) = harness.control.sent_orders().remove(0);
    assert!(harness.control.inject(BrokerEvent::OrderAck {
        request_id: request_id.clone(),
        ack: OrderAck::new(request_id, 77, ExecutionStatus::Filled),
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.handle.pending_orders().is_empty());
    let (_, health) = get(&harness.app, "/health").await;
    assert_eq!(health["session"], "ready");

    harness.control.set_order_reply(OrderReply::Ack(ExecutionStatus::Accepted));
    let (status, _) = post(&harness.app, TOKEN, VALID).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn broker_rejection_is_bad_gateway() {
    let harness = harness_with(settings(), |control| {
        control.set_order_reply(OrderReply::Reject("NOT_ENOUGH_MONEY".to_string()));
    });
    assert!(harness.handle.wait_for_state(SessionState::Ready, WAIT).await);

    let (status, body) = post(&harness.app, TOKEN, VALID).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("NOT_ENOUGH_MONEY")
    );
}

#[tokio::test]
async fn volume_below_one_unit_is_refused_without_broker() {
    let harness = ready_harness().await;

    let (status, body) = post(
        &harness.app,
        TOKEN,
        r#"{"symbolId":1234,"tradeSide":"SELL","volume":0.004}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["message"].as_str().unwrap().contains(BAD_VOLUME_CODE));
    assert!(harness.control.sent_orders().is_empty());
}

#[tokio::test]
async fn volume_too_large_for_broker_units_is_bad_request() {
    let harness = ready_harness().await;

    let (status, body) = post(
        &harness.app,
        TOKEN,
        r#"{"symbolId":1234,"tradeSide":"BUY","volume":1e27}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["field"], "volume");
    assert!(harness.control.sent_orders().is_empty());

    let (_, health) = get(&harness.app, "/health").await;
    assert_eq!(health["session"], "ready");
}

#[tokio::test]
async fn concurrent_webhooks_resolve_independently() {
    let harness = ready_harness().await;

    let requests = (0..8).map(|_| post(&harness.app, TOKEN, VALID));
    let results = futures_util::future::join_all(requests).await;

    let mut order_ids: Vec<i64> = results
        .iter()
        .map(|(status, body)| {
            assert_eq!(*status, StatusCode::OK);
            body["orderId"].as_i64().unwrap()
        })
        .collect();
    order_ids.sort_unstable();
    order_ids.dedup();
    assert_eq!(order_ids.len(), 8);
    assert!(harness.handle.pending_orders().is_empty());
}

#[tokio::test]
async fn test_mode_accepts_orders_and_reports_indicator() {
    let state = AppState::new(Arc::new(TestModeSession::new()), TOKEN, ORDER_TIMEOUT);
    let app = create_router(Arc::new(state));

    let (status, body) = post(&app, TOKEN, VALID).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["executionStatus"], "accepted");

    let (status, health) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["session"], "test-mode");

    let (status, _) = post(&app, "nope", VALID).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_mode_refuses_volume_below_one_unit() {
    let state = AppState::new(Arc::new(TestModeSession::new()), TOKEN, ORDER_TIMEOUT);
    let app = create_router(Arc::new(state));

    let (status, body) = post(
        &app,
        TOKEN,
        r#"{"symbolId":1234,"tradeSide":"SELL","volume":0.004}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["message"].as_str().unwrap().contains(BAD_VOLUME_CODE));
}
