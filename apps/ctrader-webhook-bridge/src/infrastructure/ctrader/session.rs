//! Broker Session Manager
//!
//! Single background task that owns the broker connection. It drives the
//! session state machine through connect, application auth and account
//! auth, keeps the link alive with heartbeats, reconnects with exponential
//! backoff, and correlates order acknowledgements with waiting callers.
//!
//! HTTP handlers never touch the connection. They talk to the task through a
//! cloneable [`SessionHandle`]:
//!
//! ```text
//!  handler ──Submit──► mpsc ──► SessionManager ──► BrokerClient ──► broker
//!     ▲                              │   ▲                            │
//!     │    oneshot (PendingOrders)   │   └──────── BrokerEvent ◄──────┘
//!     └──────────────────────────────┘
//!  handler ◄── watch<SessionStatus> ◄── SessionManager
//! ```
//!
//! Once the broker rejects the credentials `max_auth_failures` times in a
//! row the session moves to `Degraded` and stays there until restart.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    BrokerClient, BrokerClientError, BrokerEvent, OrderError, OrderSession,
};
use crate::application::services::PendingOrders;
use crate::domain::order::{BrokerRejection, OrderAck, OrderRequest, RequestId};
use crate::domain::session::{AuthStage, Session, SessionState, SessionStatus};
use crate::infrastructure::config::{AuthConfig, BridgeConfig, SessionSettings};
use crate::infrastructure::metrics::{self, OrderOutcome};

/// Capacity of the handle-to-task command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Broker WebSocket URL.
    pub url: String,
    /// Broker credentials.
    pub auth: AuthConfig,
    /// Timeouts, heartbeat and reconnect tuning.
    pub settings: SessionSettings,
}

impl SessionManagerConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(url: String, auth: AuthConfig, settings: SessionSettings) -> Self {
        Self {
            url,
            auth,
            settings,
        }
    }

    /// Build from the loaded bridge configuration.
    #[must_use]
    pub fn from_bridge_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.ws_url().to_string(),
            config.auth.clone(),
            config.session.clone(),
        )
    }
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    Submit {
        request_id: RequestId,
        order: OrderRequest,
    },
}

/// Cloneable front end of the session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<SessionStatus>,
    pending: Arc<PendingOrders>,
}

impl SessionHandle {
    /// Orders currently awaiting a broker answer.
    #[must_use]
    pub const fn pending_orders(&self) -> &Arc<PendingOrders> {
        &self.pending
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Wait until the session reaches `state`, giving up after `timeout`.
    ///
    /// Returns `true` if the state was reached.
    pub async fn wait_for_state(&self, state: SessionState, timeout: Duration) -> bool {
        let mut status_rx = self.status_rx.clone();
        tokio::time::timeout(timeout, status_rx.wait_for(|status| status.state == state))
            .await
            .is_ok_and(|result| result.is_ok())
    }
}

#[async_trait]
impl OrderSession for SessionHandle {
    async fn submit_order(
        &self,
        order: OrderRequest,
        timeout: Duration,
    ) -> Result<OrderAck, OrderError> {
        let state = self.status_rx.borrow().state;
        if !state.is_ready() {
            metrics::record_order_outcome(OrderOutcome::NotReady);
            return Err(OrderError::NotReady { state });
        }

        if order.volume_units().is_none() {
            metrics::record_order_outcome(OrderOutcome::Rejected);
            return Err(OrderError::Rejected(BrokerRejection::bad_volume()));
        }

        // one deadline covers queueing behind other orders and the broker answer
        let deadline = tokio::time::Instant::now() + timeout;
        let request_id = RequestId::generate();
        let ticket = self.pending.register(request_id.clone())?;

        let enqueue = tokio::time::timeout_at(
            deadline,
            self.command_tx.send(Command::Submit { request_id, order }),
        );
        let result = match enqueue.await {
            Ok(Ok(())) => ticket.wait_until(deadline, timeout).await,
            Ok(Err(_)) => Err(OrderError::BrokerUnavailable(
                "session task stopped".to_string(),
            )),
            Err(_) => Err(OrderError::Timeout(timeout)),
        };
        let outcome = match &result {
            Ok(_) => OrderOutcome::Acknowledged,
            Err(OrderError::Timeout(_)) => OrderOutcome::TimedOut,
            Err(OrderError::Rejected(_)) => OrderOutcome::Rejected,
            Err(OrderError::NotReady { .. }) => OrderOutcome::NotReady,
            Err(_) => OrderOutcome::Unavailable,
        };
        metrics::record_order_outcome(outcome);
        result
    }

    fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Owner of the broker connection.
pub struct SessionManager<C> {
    config: SessionManagerConfig,
    client: C,
    session: Session,
    events: Option<mpsc::Receiver<BrokerEvent>>,
    reconnect: ReconnectPolicy,
    heartbeat: HeartbeatMonitor,
    auth_deadline: Option<Instant>,
    status_tx: watch::Sender<SessionStatus>,
    command_rx: mpsc::Receiver<Command>,
    pending: Arc<PendingOrders>,
    cancel: CancellationToken,
}

impl<C: BrokerClient + 'static> SessionManager<C> {
    /// Create the manager and its handle. Nothing connects until [`run`](Self::run).
    #[must_use]
    pub fn new(
        config: SessionManagerConfig,
        client: C,
        cancel: CancellationToken,
    ) -> (Self, SessionHandle) {
        let session = Session::new();
        let (status_tx, status_rx) = watch::channel(session.status());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let pending = Arc::new(PendingOrders::new());

        let reconnect = ReconnectPolicy::new(ReconnectConfig::from_session_settings(
            &config.settings,
        ));
        let heartbeat = HeartbeatMonitor::new(
            HeartbeatConfig::from_session_settings(&config.settings),
            Instant::now(),
        );

        let handle = SessionHandle {
            command_tx,
            status_rx,
            pending: Arc::clone(&pending),
        };
        let manager = Self {
            config,
            client,
            session,
            events: None,
            reconnect,
            heartbeat,
            auth_deadline: None,
            status_tx,
            command_rx,
            pending,
            cancel,
        };
        (manager, handle)
    }

    /// Create the manager and run it on a new task.
    #[must_use]
    pub fn spawn(
        config: SessionManagerConfig,
        client: C,
        cancel: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (manager, handle) = Self::new(config, client, cancel);
        (handle, tokio::spawn(manager.run()))
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        tracing::info!(url = %self.config.url, "Starting broker session");
        self.connect().await;

        let mut tick = tokio::time::interval(self.config.settings.heartbeat_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let backoff = self.session.backoff_deadline();
            let auth_deadline = self.auth_deadline;
            let connected = self.session.state().has_transport();

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.shutdown().await;
                    break;
                }
                Some(command) = self.command_rx.recv() => {
                    self.on_command(command).await;
                }
                event = next_event(self.events.as_mut()) => {
                    let event = event.unwrap_or_else(|| BrokerEvent::Disconnected {
                        reason: "event stream closed".to_string(),
                    });
                    self.on_event(event).await;
                }
                () = sleep_until(auth_deadline) => {
                    tracing::warn!("Broker did not answer authentication in time");
                    self.on_connection_failure("authentication timed out").await;
                }
                () = sleep_until(backoff) => {
                    self.connect().await;
                }
                _ = tick.tick(), if connected => {
                    self.on_heartbeat_tick().await;
                }
            }
        }

        tracing::info!("Broker session stopped");
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    async fn connect(&mut self) {
        if !self.set_state(SessionState::Connecting) {
            return;
        }
        metrics::record_connect_attempt();

        let attempt = tokio::time::timeout(
            self.config.settings.connect_timeout,
            self.client.connect(&self.config.url),
        )
        .await;

        let events = match attempt {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                self.on_connection_failure(e.to_string()).await;
                return;
            }
            Err(_) => {
                self.on_connection_failure("connect timed out").await;
                return;
            }
        };

        tracing::info!("Connected to broker, authenticating");
        self.events = Some(events);
        self.heartbeat.reset(Instant::now());
        self.set_state(SessionState::Connected);
        self.set_state(SessionState::Authenticating);

        let auth = &self.config.auth;
        let write = self
            .client
            .send_app_auth(auth.client_id(), auth.client_secret());
        match bounded_write(self.config.settings.write_timeout, write).await {
            Ok(()) => self.arm_auth_deadline(),
            Err(e) => self.on_connection_failure(e.to_string()).await,
        }
    }

    async fn on_connection_failure(&mut self, reason: impl Into<String> + Send) {
        let reason = reason.into();
        self.drop_connection(&reason).await;

        self.set_state(SessionState::Disconnected);
        self.session.record_error(reason.clone());
        let delay = self.reconnect.next_delay();
        let attempt = self.session.schedule_retry(Instant::now() + delay);
        self.publish();

        metrics::record_reconnect();
        tracing::warn!(
            reason = %reason,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Broker connection lost, scheduling reconnect"
        );
    }

    async fn on_auth_failure(&mut self, rejection: &BrokerRejection, invalid_credentials: bool) {
        metrics::record_session_error("auth_rejected");
        if invalid_credentials {
            let failures = self.session.record_auth_rejection();
            let max = self.config.settings.max_auth_failures;
            if failures >= max {
                let reason = format!("credentials rejected {failures} times: {rejection}");
                self.drop_connection(&reason).await;
                self.session.record_error(reason.clone());
                self.set_state(SessionState::Degraded);
                tracing::error!(
                    code = %rejection.code,
                    failures,
                    "Broker rejected credentials, giving up until restart"
                );
                return;
            }
            tracing::warn!(code = %rejection.code, failures, max, "Broker rejected credentials");
        }

        self.on_connection_failure(format!("authentication failed: {rejection}"))
            .await;
    }

    async fn drop_connection(&mut self, reason: &str) {
        if tokio::time::timeout(self.config.settings.write_timeout, self.client.close())
            .await
            .is_err()
        {
            tracing::warn!("Broker close handshake timed out");
        }
        self.events = None;
        self.auth_deadline = None;

        let failed = self
            .pending
            .fail_all(&OrderError::BrokerUnavailable(reason.to_string()));
        if failed > 0 {
            tracing::warn!(failed, "Failed in-flight orders after connection loss");
        }
        metrics::set_pending_orders(self.pending.len());
    }

    async fn shutdown(&mut self) {
        tracing::info!("Shutting down broker session");
        self.drop_connection("session shutting down").await;
        if self.session.state() != SessionState::Degraded {
            self.set_state(SessionState::Disconnected);
        }
    }

    fn arm_auth_deadline(&mut self) {
        let now = Instant::now();
        self.heartbeat.record_outbound(now);
        self.auth_deadline = Some(now + self.config.settings.auth_timeout);
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    async fn on_event(&mut self, event: BrokerEvent) {
        self.heartbeat.record_inbound(Instant::now());

        match event {
            BrokerEvent::AppAuthAck => self.on_app_auth_ack().await,
            BrokerEvent::AccountAuthAck { account_id } => self.on_account_auth_ack(account_id),
            BrokerEvent::OrderAck { request_id, ack } => {
                self.resolve(&request_id, Ok(ack));
            }
            BrokerEvent::OrderReject {
                request_id: Some(request_id),
                rejection,
            } => {
                self.resolve(&request_id, Err(OrderError::Rejected(rejection)));
            }
            BrokerEvent::OrderReject {
                request_id: None,
                rejection,
            } => {
                tracing::warn!(code = %rejection.code, "Uncorrelated order rejection");
            }
            BrokerEvent::Error {
                request_id,
                rejection,
                invalid_credentials,
            } => {
                self.on_error(request_id, rejection, invalid_credentials)
                    .await;
            }
            BrokerEvent::Heartbeat => tracing::trace!("Broker heartbeat"),
            BrokerEvent::Disconnected { reason } => {
                metrics::record_session_error("disconnected");
                self.on_connection_failure(reason).await;
            }
        }
    }

    async fn on_app_auth_ack(&mut self) {
        if self.session.auth_stage() != Some(AuthStage::Application) {
            tracing::debug!(
                state = %self.session.state(),
                "Ignoring unexpected application auth ack"
            );
            return;
        }

        tracing::debug!("Application authenticated, authorizing account");
        self.session.advance_auth();
        let auth = &self.config.auth;
        let write = self
            .client
            .send_account_auth(auth.access_token(), auth.account_id());
        match bounded_write(self.config.settings.write_timeout, write).await {
            Ok(()) => self.arm_auth_deadline(),
            Err(e) => self.on_connection_failure(e.to_string()).await,
        }
    }

    fn on_account_auth_ack(&mut self, account_id: i64) {
        if self.session.auth_stage() != Some(AuthStage::Account) {
            tracing::debug!(state = %self.session.state(), "Ignoring unexpected account auth ack");
            return;
        }

        self.auth_deadline = None;
        self.reconnect.reset();
        if self.set_state(SessionState::Ready) {
            tracing::info!(account_id, "Broker session ready");
        }
    }

    async fn on_error(
        &mut self,
        request_id: Option<RequestId>,
        rejection: BrokerRejection,
        invalid_credentials: bool,
    ) {
        if let Some(request_id) = &request_id
            && self.pending.contains(request_id)
        {
            self.resolve(request_id, Err(OrderError::Rejected(rejection)));
            return;
        }

        match self.session.state() {
            SessionState::Authenticating => {
                self.on_auth_failure(&rejection, invalid_credentials).await;
            }
            SessionState::Ready if invalid_credentials => {
                metrics::record_session_error("token_invalidated");
                self.on_connection_failure(format!("credentials invalidated: {rejection}"))
                    .await;
            }
            state => {
                tracing::warn!(
                    state = %state,
                    code = %rejection.code,
                    description = %rejection.description,
                    "Broker error"
                );
            }
        }
    }

    fn resolve(&self, request_id: &RequestId, result: Result<OrderAck, OrderError>) {
        let accepted = result.is_ok();
        match self.pending.resolve(request_id, result) {
            Some(latency) => {
                tracing::debug!(
                    request_id = %request_id,
                    accepted,
                    latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    "Order resolved"
                );
                metrics::record_order_latency(latency);
            }
            None => {
                tracing::debug!(
                    request_id = %request_id,
                    accepted,
                    "Discarding broker answer with no pending order"
                );
                metrics::record_late_response();
            }
        }
        metrics::set_pending_orders(self.pending.len());
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { request_id, order } => self.submit(request_id, order).await,
        }
    }

    async fn submit(&mut self, request_id: RequestId, order: OrderRequest) {
        let state = self.session.state();
        if !state.is_ready() {
            self.pending
                .resolve(&request_id, Err(OrderError::NotReady { state }));
            return;
        }
        if !self.pending.contains(&request_id) {
            tracing::debug!(request_id = %request_id, "Caller gone before order was sent");
            return;
        }

        let write = self.client.send_order(&request_id, &order);
        match bounded_write(self.config.settings.write_timeout, write).await {
            Ok(()) => {
                self.heartbeat.record_outbound(Instant::now());
                metrics::record_order_submitted();
                metrics::set_pending_orders(self.pending.len());
                tracing::info!(
                    request_id = %request_id,
                    symbol_id = order.symbol_id(),
                    side = %order.side(),
                    volume = %order.volume(),
                    "Order sent to broker"
                );
            }
            Err(e) => {
                let reason = e.to_string();
                self.pending
                    .resolve(&request_id, Err(OrderError::BrokerUnavailable(reason.clone())));
                self.on_connection_failure(reason).await;
            }
        }
    }

    async fn on_heartbeat_tick(&mut self) {
        let now = Instant::now();
        match self.heartbeat.check(now) {
            HeartbeatAction::Idle => {}
            HeartbeatAction::SendHeartbeat => {
                let write = self.client.send_heartbeat();
                match bounded_write(self.config.settings.write_timeout, write).await {
                    Ok(()) => self.heartbeat.record_outbound(now),
                    Err(e) => self.on_connection_failure(e.to_string()).await,
                }
            }
            HeartbeatAction::Timeout => {
                metrics::record_session_error("heartbeat_timeout");
                let silence = self.heartbeat.since_inbound(now);
                self.on_connection_failure(format!("no broker traffic for {silence:?}"))
                    .await;
            }
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Apply a transition and publish it. Returns `false` if it was illegal.
    fn set_state(&mut self, next: SessionState) -> bool {
        if self.session.state() == next {
            return true;
        }
        match self.session.transition(next) {
            Ok(previous) => {
                tracing::debug!(from = %previous, to = %next, "Session state changed");
                metrics::set_session_state(next);
                self.publish();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring session transition");
                false
            }
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.session.status());
    }
}

async fn next_event(events: Option<&mut mpsc::Receiver<BrokerEvent>>) -> Option<BrokerEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Await a client write, failing it once `limit` has passed.
async fn bounded_write(
    limit: Duration,
    write: impl Future<Output = Result<(), BrokerClientError>>,
) -> Result<(), BrokerClientError> {
    tokio::time::timeout(limit, write).await.unwrap_or_else(|_| {
        Err(BrokerClientError::SendFailed(format!(
            "write stalled for {limit:?}"
        )))
    })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{BAD_VOLUME_CODE, ExecutionStatus, TradeSide};
    use crate::infrastructure::config::HostType;
    use crate::infrastructure::ctrader::mock::{
        AuthReply, MockBrokerClient, MockBrokerControl, OrderReply,
    };
    use rust_decimal_macros::dec;

    const WAIT: Duration = Duration::from_secs(2);

    fn settings() -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_millis(200),
            auth_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_secs(5),
            reconnect_delay_initial: Duration::from_millis(10),
            reconnect_delay_max: Duration::from_millis(40),
            reconnect_jitter: 0.0,
            max_auth_failures: 3,
        }
    }

    fn config(settings: SessionSettings) -> SessionManagerConfig {
        let auth = AuthConfig::new(
            HostType::Demo,
            "client".to_string(),
            "secret".to_string(),
            "access".to_string(),
            42,
            "hook".to_string(),
        );
        SessionManagerConfig::new("mock://broker".to_string(), auth, settings)
    }

    fn start(settings: SessionSettings) -> (SessionHandle, MockBrokerControl, CancellationToken) {
        let (client, control) = MockBrokerClient::new();
        let cancel = CancellationToken::new();
        let (handle, _task) = SessionManager::spawn(config(settings), client, cancel.clone());
        (handle, control, cancel)
    }

    fn order() -> OrderRequest {
        OrderRequest::new(1, TradeSide::Buy, dec!(0.01)).unwrap()
    }

    #[tokio::test]
    async fn authenticates_and_becomes_ready() {
        let (handle, control, cancel) = start(settings());
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);
        assert_eq!(control.connect_count(), 1);
        assert_eq!(handle.status().retry_count, 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn submit_resolves_with_broker_ack() {
        let (handle, control, cancel) = start(settings());
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        let ack = handle.submit_order(order(), WAIT).await.unwrap();
        assert_eq!(ack.execution_status, ExecutionStatus::Accepted);

        let sent = control.sent_orders();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ack.request_id);
        assert!(handle.pending_orders().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn submit_before_ready_fails_fast() {
        let (client, control) = MockBrokerClient::new();
        control.set_app_auth(AuthReply::Ignore);
        let cancel = CancellationToken::new();
        let (handle, _task) = SessionManager::spawn(config(settings()), client, cancel.clone());

        assert!(handle.wait_for_state(SessionState::Authenticating, WAIT).await);
        let err = handle.submit_order(order(), WAIT).await.unwrap_err();
        assert!(matches!(err, OrderError::NotReady { .. }));
        assert!(control.sent_orders().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn tiny_volume_is_refused_locally() {
        let (handle, control, cancel) = start(settings());
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        let tiny = OrderRequest::new(1, TradeSide::Sell, dec!(0.001)).unwrap();
        match handle.submit_order(tiny, WAIT).await {
            Err(OrderError::Rejected(rejection)) => assert_eq!(rejection.code, BAD_VOLUME_CODE),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(control.sent_orders().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn broker_rejection_is_returned() {
        let (handle, control, cancel) = start(settings());
        control.set_order_reply(OrderReply::Reject("MARKET_CLOSED".to_string()));
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        match handle.submit_order(order(), WAIT).await {
            Err(OrderError::Rejected(rejection)) => assert_eq!(rejection.code, "MARKET_CLOSED"),
            other => panic!("unexpected result: {other:?}"),
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn timeout_then_late_ack_is_discarded() {
        let (handle, control, cancel) = start(settings());
        control.set_order_reply(OrderReply::Ignore);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        let timeout = Duration::from_millis(50);
        let err = handle.submit_order(order(), timeout).await.unwrap_err();
        assert_eq!(err, OrderError::Timeout(timeout));
        assert!(handle.pending_orders().is_empty());

        let (request_id, _) = control.sent_orders().remove(0);
        assert!(control.inject(BrokerEvent::OrderAck {
            request_id: request_id.clone(),
            ack: OrderAck::new(request_id, 9, ExecutionStatus::Filled),
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.pending_orders().is_empty());
        assert!(handle.status().is_ready());
        cancel.cancel();
    }

    #[tokio::test]
    async fn error_for_pending_order_resolves_as_rejection() {
        let (handle, control, cancel) = start(settings());
        control.set_order_reply(OrderReply::Ignore);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        let submit = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit_order(order(), WAIT).await })
        };
        while control.sent_orders().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let (request_id, _) = control.sent_orders().remove(0);
        control.inject(BrokerEvent::Error {
            request_id: Some(request_id),
            rejection: BrokerRejection::new("INVALID_REQUEST", "bad symbol"),
            invalid_credentials: false,
        });

        match submit.await.unwrap() {
            Err(OrderError::Rejected(rejection)) => assert_eq!(rejection.code, "INVALID_REQUEST"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(handle.status().is_ready());
        cancel.cancel();
    }

    #[tokio::test]
    async fn send_failure_reports_unavailable_and_reconnects() {
        let (handle, control, cancel) = start(settings());
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        control.set_fail_sends(true);
        let err = handle.submit_order(order(), WAIT).await.unwrap_err();
        assert!(matches!(err, OrderError::BrokerUnavailable(_)));

        control.set_fail_sends(false);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);
        assert!(control.connect_count() >= 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn stalled_write_times_out_caller_and_reconnects() {
        let mut settings = settings();
        settings.reconnect_delay_initial = Duration::from_millis(100);
        let (handle, control, cancel) = start(settings);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        control.set_stall_orders(true);
        let budget = Duration::from_millis(50);
        let started = std::time::Instant::now();
        let err = handle.submit_order(order(), budget).await.unwrap_err();
        assert_eq!(err, OrderError::Timeout(budget));
        assert!(started.elapsed() < Duration::from_secs(1));

        control.set_stall_orders(false);
        let mut status_rx = handle.subscribe();
        let status = tokio::time::timeout(
            WAIT,
            status_rx.wait_for(|s| {
                s.last_error
                    .as_deref()
                    .is_some_and(|e| e.contains("write stalled"))
            }),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_ne!(status.state, SessionState::Ready);

        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);
        assert!(control.connect_count() >= 2);
        assert!(handle.pending_orders().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn callers_queued_behind_stalled_write_keep_their_deadline() {
        let (handle, control, cancel) = start(settings());
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);
        control.set_stall_orders(true);

        let budget = Duration::from_millis(80);
        let started = std::time::Instant::now();
        let callers = (0..COMMAND_CHANNEL_CAPACITY + 40).map(|_| {
            let handle = handle.clone();
            async move { handle.submit_order(order(), budget).await }
        });
        let results = futures_util::future::join_all(callers).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(
            results
                .iter()
                .all(|result| *result == Err(OrderError::Timeout(budget)))
        );
        assert!(handle.pending_orders().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn silent_auth_times_out_and_retries() {
        let (client, control) = MockBrokerClient::new();
        control.set_account_auth(AuthReply::Ignore);
        let cancel = CancellationToken::new();
        let (handle, _task) = SessionManager::spawn(config(settings()), client, cancel.clone());

        let mut status_rx = handle.subscribe();
        let status = tokio::time::timeout(
            WAIT,
            status_rx.wait_for(|s| s.last_error.as_deref() == Some("authentication timed out")),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_ne!(status.state, SessionState::Ready);

        control.set_account_auth(AuthReply::Accept);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);
        assert!(control.connect_count() >= 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn non_credential_auth_error_does_not_degrade() {
        let (client, control) = MockBrokerClient::new();
        control.set_app_auth(AuthReply::Reject {
            code: "SERVER_BUSY".to_string(),
            invalid_credentials: false,
        });
        let cancel = CancellationToken::new();
        let mut settings = settings();
        settings.max_auth_failures = 1;
        let (handle, _task) = SessionManager::spawn(config(settings), client, cancel.clone());

        let retried = {
            let control = control.clone();
            async move {
                while control.connect_count() < 3 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        };
        tokio::time::timeout(WAIT, retried).await.unwrap();
        assert_ne!(handle.status().state, SessionState::Degraded);
        cancel.cancel();
    }

    #[tokio::test]
    async fn heartbeats_are_sent_while_idle() {
        let (handle, control, cancel) = start(settings());
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(control.heartbeats_sent() >= 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn inbound_silence_drops_connection() {
        let mut settings = settings();
        settings.heartbeat_timeout = Duration::from_millis(100);
        let (handle, control, cancel) = start(settings);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        // the mock never sends anything after auth, so the session must recycle
        let reconnected = async {
            while control.connect_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(WAIT, reconnected).await.unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn shutdown_fails_in_flight_orders() {
        let (handle, control, cancel) = start(settings());
        control.set_order_reply(OrderReply::Ignore);
        assert!(handle.wait_for_state(SessionState::Ready, WAIT).await);

        let submit = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit_order(order(), WAIT).await })
        };
        while control.sent_orders().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        let err = submit.await.unwrap().unwrap_err();
        assert!(matches!(err, OrderError::BrokerUnavailable(_)));
        assert!(handle.wait_for_state(SessionState::Disconnected, WAIT).await);
    }
}
