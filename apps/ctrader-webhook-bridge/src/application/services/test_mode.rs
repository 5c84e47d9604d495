//! Offline Order Session
//!
//! Stand-in for the broker session when the bridge runs with `--test`.
//! Every order the live session would send is acknowledged immediately with
//! a locally generated order id, and the status always reads as test mode.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{OrderError, OrderSession};
use crate::domain::order::{BrokerRejection, ExecutionStatus, OrderAck, OrderRequest, RequestId};
use crate::domain::session::SessionStatus;

/// First order id handed out in test mode.
const FIRST_TEST_ORDER_ID: i64 = 1;

/// [`OrderSession`] that never talks to a broker.
#[derive(Debug)]
pub struct TestModeSession {
    next_order_id: AtomicI64,
}

impl Default for TestModeSession {
    fn default() -> Self {
        Self {
            next_order_id: AtomicI64::new(FIRST_TEST_ORDER_ID),
        }
    }
}

impl TestModeSession {
    /// Create a test-mode session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderSession for TestModeSession {
    async fn submit_order(
        &self,
        order: OrderRequest,
        _timeout: Duration,
    ) -> Result<OrderAck, OrderError> {
        if order.volume_units().is_none() {
            return Err(OrderError::Rejected(BrokerRejection::bad_volume()));
        }

        let request_id = RequestId::generate();
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            request_id = %request_id,
            order_id,
            symbol_id = order.symbol_id(),
            side = %order.side(),
            volume = %order.volume(),
            "Test mode: order accepted without broker"
        );
        Ok(OrderAck::new(request_id, order_id, ExecutionStatus::Accepted))
    }

    fn status(&self) -> SessionStatus {
        SessionStatus::test_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::TradeSide;
    use crate::domain::session::SessionState;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn accepts_orders_with_increasing_ids() {
        let session = TestModeSession::new();
        let order = OrderRequest::new(1, TradeSide::Buy, dec!(0.1)).unwrap();

        let first = session
            .submit_order(order.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        let second = session
            .submit_order(order, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(first.execution_status, ExecutionStatus::Accepted);
        assert_eq!(second.order_id, first.order_id + 1);
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn refuses_volume_below_one_unit_like_live_session() {
        let session = TestModeSession::new();
        let order = OrderRequest::new(1, TradeSide::Buy, dec!(0.004)).unwrap();

        let err = session
            .submit_order(order, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, OrderError::Rejected(BrokerRejection::bad_volume()));

        let order = OrderRequest::new(1, TradeSide::Buy, dec!(0.01)).unwrap();
        let ack = session
            .submit_order(order, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(ack.order_id, FIRST_TEST_ORDER_ID);
    }

    #[test]
    fn status_is_test_mode() {
        let status = TestModeSession::new().status();
        assert!(status.test_mode);
        assert_eq!(status.state, SessionState::Ready);
    }
}
