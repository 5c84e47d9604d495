//! Broker Client Port (Driven Port)
//!
//! Transport-level interface to the broker's streaming API. The session
//! manager drives it; adapters encode the calls onto the wire and decode
//! inbound frames into [`BrokerEvent`]s.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::order::{BrokerRejection, OrderAck, OrderRequest, RequestId};

/// Inbound broker message, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Application credentials accepted.
    AppAuthAck,
    /// Trading account authorized.
    AccountAuthAck {
        /// Authorized account id.
        account_id: i64,
    },
    /// Order accepted or executed.
    OrderAck {
        /// Correlation id echoed by the broker.
        request_id: RequestId,
        /// Acknowledgement details.
        ack: OrderAck,
    },
    /// Order refused.
    OrderReject {
        /// Correlation id, when the broker echoed one.
        request_id: Option<RequestId>,
        /// Broker reason.
        rejection: BrokerRejection,
    },
    /// Generic error response.
    Error {
        /// Correlation id, when the broker echoed one.
        request_id: Option<RequestId>,
        /// Broker reason.
        rejection: BrokerRejection,
        /// Error reports bad or expired credentials.
        invalid_credentials: bool,
    },
    /// Keep-alive from the broker.
    Heartbeat,
    /// Transport closed or broker ended the session.
    Disconnected {
        /// Human-readable reason.
        reason: String,
    },
}

/// Broker client errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerClientError {
    /// Transport could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation requires an open connection.
    #[error("not connected")]
    NotConnected,

    /// Writing to the transport failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Outbound message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Port for the broker's streaming connection.
///
/// One connection at a time. `connect` returns the event stream for that
/// connection; the stream ends with [`BrokerEvent::Disconnected`] or closes.
#[async_trait]
pub trait BrokerClient: Send {
    /// Open a connection to `url`.
    async fn connect(&mut self, url: &str)
    -> Result<mpsc::Receiver<BrokerEvent>, BrokerClientError>;

    /// Send application authentication.
    async fn send_app_auth(
        &mut self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), BrokerClientError>;

    /// Send trading account authentication.
    async fn send_account_auth(
        &mut self,
        access_token: &str,
        account_id: i64,
    ) -> Result<(), BrokerClientError>;

    /// Send a market order tagged with `request_id`.
    async fn send_order(
        &mut self,
        request_id: &RequestId,
        order: &OrderRequest,
    ) -> Result<(), BrokerClientError>;

    /// Send a keep-alive.
    async fn send_heartbeat(&mut self) -> Result<(), BrokerClientError>;

    /// Close the current connection, if any.
    async fn close(&mut self);
}
