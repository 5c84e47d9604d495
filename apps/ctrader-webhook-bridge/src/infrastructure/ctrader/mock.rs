//! Mock Broker Client
//!
//! Scriptable in-memory [`BrokerClient`] for tests and local development.
//! The paired [`MockBrokerControl`] decides how the fake broker answers
//! connects, authentication and orders, and lets a test inject events or
//! drop the connection at any point.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{BrokerClient, BrokerClientError, BrokerEvent};
use crate::domain::order::{
    BrokerRejection, ExecutionStatus, OrderAck, OrderRequest, RequestId,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// First broker order id handed out by the mock.
const FIRST_ORDER_ID: i64 = 1_000;

/// How the fake broker answers an authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthReply {
    /// Acknowledge.
    #[default]
    Accept,
    /// Answer with an error response.
    Reject {
        /// Broker error code.
        code: String,
        /// Whether the code marks the credentials as unusable.
        invalid_credentials: bool,
    },
    /// Never answer.
    Ignore,
}

impl AuthReply {
    /// Credential rejection with `CH_CLIENT_AUTH_FAILURE`.
    #[must_use]
    pub fn bad_credentials() -> Self {
        Self::Reject {
            code: "CH_CLIENT_AUTH_FAILURE".to_string(),
            invalid_credentials: true,
        }
    }
}

/// How the fake broker answers a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderReply {
    /// Acknowledge with the given execution status.
    Ack(ExecutionStatus),
    /// Reject with a broker error code.
    Reject(String),
    /// Never answer.
    Ignore,
}

impl Default for OrderReply {
    fn default() -> Self {
        Self::Ack(ExecutionStatus::Accepted)
    }
}

#[derive(Debug)]
struct MockState {
    connect_failures: u32,
    app_auth: AuthReply,
    account_auth: AuthReply,
    order_reply: OrderReply,
    fail_sends: bool,
    stall_orders: bool,
    event_tx: Option<mpsc::Sender<BrokerEvent>>,
    connect_count: u32,
    heartbeats_sent: u32,
    sent_orders: Vec<(RequestId, OrderRequest)>,
    next_order_id: i64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            connect_failures: 0,
            app_auth: AuthReply::default(),
            account_auth: AuthReply::default(),
            order_reply: OrderReply::default(),
            fail_sends: false,
            stall_orders: false,
            event_tx: None,
            connect_count: 0,
            heartbeats_sent: 0,
            sent_orders: Vec::new(),
            next_order_id: FIRST_ORDER_ID,
        }
    }
}

impl MockState {
    fn emit(&self, event: BrokerEvent) -> bool {
        self.event_tx
            .as_ref()
            .is_some_and(|tx| tx.try_send(event).is_ok())
    }

    fn ensure_sendable(&self) -> Result<(), BrokerClientError> {
        if self.event_tx.is_none() {
            return Err(BrokerClientError::NotConnected);
        }
        if self.fail_sends {
            return Err(BrokerClientError::SendFailed("scripted send failure".to_string()));
        }
        Ok(())
    }

    fn reply_to_order(&mut self, request_id: &RequestId) {
        match self.order_reply.clone() {
            OrderReply::Ack(status) => {
                let order_id = self.next_order_id;
                self.next_order_id += 1;
                self.emit(BrokerEvent::OrderAck {
                    request_id: request_id.clone(),
                    ack: OrderAck::new(request_id.clone(), order_id, status),
                });
            }
            OrderReply::Reject(code) => {
                self.emit(BrokerEvent::OrderReject {
                    request_id: Some(request_id.clone()),
                    rejection: BrokerRejection::new(code, "rejected by mock broker"),
                });
            }
            OrderReply::Ignore => {}
        }
    }

    fn auth_reply(&self, reply: &AuthReply, ack: BrokerEvent) {
        match reply {
            AuthReply::Accept => {
                self.emit(ack);
            }
            AuthReply::Reject {
                code,
                invalid_credentials,
            } => {
                self.emit(BrokerEvent::Error {
                    request_id: None,
                    rejection: BrokerRejection::new(code.clone(), "authentication rejected"),
                    invalid_credentials: *invalid_credentials,
                });
            }
            AuthReply::Ignore => {}
        }
    }
}

/// Test-side handle that scripts and inspects a [`MockBrokerClient`].
#[derive(Debug, Clone, Default)]
pub struct MockBrokerControl {
    state: Arc<Mutex<MockState>>,
}

impl MockBrokerControl {
    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().connect_failures = count;
    }

    /// Script the application-auth answer.
    pub fn set_app_auth(&self, reply: AuthReply) {
        self.state.lock().app_auth = reply;
    }

    /// Script the account-auth answer.
    pub fn set_account_auth(&self, reply: AuthReply) {
        self.state.lock().account_auth = reply;
    }

    /// Script the answer to new orders.
    pub fn set_order_reply(&self, reply: OrderReply) {
        self.state.lock().order_reply = reply;
    }

    /// Make every send fail while connected.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Make order writes hang as on a stalled socket. Orders are still recorded.
    pub fn set_stall_orders(&self, stall: bool) {
        self.state.lock().stall_orders = stall;
    }

    /// Push an event onto the live connection.
    ///
    /// Returns `false` when no connection is open.
    pub fn inject(&self, event: BrokerEvent) -> bool {
        self.state.lock().emit(event)
    }

    /// Simulate the broker dropping the connection.
    pub fn drop_connection(&self, reason: &str) {
        let mut state = self.state.lock();
        state.emit(BrokerEvent::Disconnected {
            reason: reason.to_string(),
        });
        state.event_tx = None;
    }

    /// Whether a connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().event_tx.is_some()
    }

    /// Number of connect attempts so far, failed ones included.
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connect_count
    }

    /// Number of heartbeats sent by the session.
    #[must_use]
    pub fn heartbeats_sent(&self) -> u32 {
        self.state.lock().heartbeats_sent
    }

    /// Orders received so far, in order.
    #[must_use]
    pub fn sent_orders(&self) -> Vec<(RequestId, OrderRequest)> {
        self.state.lock().sent_orders.clone()
    }
}

/// In-memory broker client driven by a [`MockBrokerControl`].
#[derive(Debug)]
pub struct MockBrokerClient {
    control: MockBrokerControl,
}

impl MockBrokerClient {
    /// Create a client and its control handle.
    #[must_use]
    pub fn new() -> (Self, MockBrokerControl) {
        let control = MockBrokerControl::default();
        (
            Self {
                control: control.clone(),
            },
            control,
        )
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn connect(
        &mut self,
        _url: &str,
    ) -> Result<mpsc::Receiver<BrokerEvent>, BrokerClientError> {
        let mut state = self.control.state.lock();
        state.connect_count += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(BrokerClientError::ConnectionFailed(
                "scripted connect failure".to_string(),
            ));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        state.event_tx = Some(event_tx);
        Ok(event_rx)
    }

    async fn send_app_auth(
        &mut self,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<(), BrokerClientError> {
        let state = self.control.state.lock();
        state.ensure_sendable()?;
        state.auth_reply(&state.app_auth, BrokerEvent::AppAuthAck);
        Ok(())
    }

    async fn send_account_auth(
        &mut self,
        _access_token: &str,
        account_id: i64,
    ) -> Result<(), BrokerClientError> {
        let state = self.control.state.lock();
        state.ensure_sendable()?;
        state.auth_reply(
            &state.account_auth,
            BrokerEvent::AccountAuthAck { account_id },
        );
        Ok(())
    }

    async fn send_order(
        &mut self,
        request_id: &RequestId,
        order: &OrderRequest,
    ) -> Result<(), BrokerClientError> {
        {
            let mut state = self.control.state.lock();
            state.ensure_sendable()?;
            state.sent_orders.push((request_id.clone(), order.clone()));
            if !state.stall_orders {
                state.reply_to_order(request_id);
                return Ok(());
            }
        }
        std::future::pending().await
    }

    async fn send_heartbeat(&mut self) -> Result<(), BrokerClientError> {
        let mut state = self.control.state.lock();
        state.ensure_sendable()?;
        state.heartbeats_sent += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.control.state.lock().event_tx = None;
    }
}
