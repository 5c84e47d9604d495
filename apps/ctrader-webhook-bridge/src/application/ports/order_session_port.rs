//! Order Session Port (Driver Port)
//!
//! What the webhook pipeline needs from a broker session: submit one market
//! order and wait for its outcome, and report the session status.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::order::{BrokerRejection, OrderAck, OrderRequest, RequestId};
use crate::domain::session::{SessionState, SessionStatus};

/// Why an order submission did not produce an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// Session is not in the `Ready` state.
    #[error("broker session not ready (state: {state})")]
    NotReady {
        /// State at the time of submission.
        state: SessionState,
    },

    /// No broker answer within the allotted time.
    #[error("no broker response within {0:?}")]
    Timeout(Duration),

    /// Broker refused the order.
    #[error("order rejected by broker: {0}")]
    Rejected(BrokerRejection),

    /// Connection was lost while the order was in flight.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A pending order with this request id already exists.
    #[error("duplicate request id: {0}")]
    DuplicateRequest(RequestId),
}

/// Port for submitting orders over a broker session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderSession: Send + Sync {
    /// Submit a market order and wait up to `timeout` for its outcome.
    ///
    /// Fails fast with [`OrderError::NotReady`] unless the session is ready.
    async fn submit_order(
        &self,
        order: OrderRequest,
        timeout: Duration,
    ) -> Result<OrderAck, OrderError>;

    /// Current session status.
    fn status(&self) -> SessionStatus;
}
