//! Pending Order Table
//!
//! Correlates submitted orders with the callers waiting on them. Each entry
//! owns a oneshot sender; whoever removes the entry first decides the
//! outcome. Removal and send happen under the same lock, so a broker answer
//! and a caller timeout can never both win.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::application::ports::OrderError;
use crate::domain::order::{OrderAck, RequestId};

/// Outcome delivered to a waiting caller.
pub type OrderResult = Result<OrderAck, OrderError>;

#[derive(Debug)]
struct PendingOrder {
    submitted_at: Instant,
    result_tx: oneshot::Sender<OrderResult>,
}

/// Outstanding orders keyed by request id.
#[derive(Debug, Default)]
pub struct PendingOrders {
    inner: Mutex<HashMap<RequestId, PendingOrder>>,
}

impl PendingOrders {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending order and return the caller's ticket.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::DuplicateRequest`] if `request_id` is already
    /// pending.
    pub fn register(self: &Arc<Self>, request_id: RequestId) -> Result<PendingTicket, OrderError> {
        let (result_tx, result_rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if inner.contains_key(&request_id) {
                return Err(OrderError::DuplicateRequest(request_id));
            }
            inner.insert(
                request_id.clone(),
                PendingOrder {
                    submitted_at: Instant::now(),
                    result_tx,
                },
            );
        }

        Ok(PendingTicket {
            request_id,
            result_rx,
            orders: Arc::clone(self),
        })
    }

    /// Resolve a pending order.
    ///
    /// Returns the time since submission, or `None` if nothing was pending
    /// under `request_id` (already resolved, timed out, or never sent).
    pub fn resolve(&self, request_id: &RequestId, result: OrderResult) -> Option<Duration> {
        let mut inner = self.inner.lock();
        let pending = inner.remove(request_id)?;
        let elapsed = pending.submitted_at.elapsed();
        // receiver may already be gone if the caller disconnected
        let _ = pending.result_tx.send(result);
        Some(elapsed)
    }

    /// Remove a pending order without resolving it.
    ///
    /// Returns `true` if the entry was still pending.
    pub fn abandon(&self, request_id: &RequestId) -> bool {
        self.inner.lock().remove(request_id).is_some()
    }

    /// Fail every pending order, returning how many were failed.
    pub fn fail_all(&self, error: &OrderError) -> usize {
        let drained: Vec<PendingOrder> = {
            let mut inner = self.inner.lock();
            inner.drain().map(|(_, pending)| pending).collect()
        };
        let count = drained.len();
        for pending in drained {
            let _ = pending.result_tx.send(Err(error.clone()));
        }
        count
    }

    /// Whether `request_id` is pending.
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.inner.lock().contains_key(request_id)
    }

    /// Number of pending orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no orders are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Caller side of a pending order.
///
/// Dropping the ticket removes the entry, so a caller that goes away never
/// leaks a table slot.
#[derive(Debug)]
pub struct PendingTicket {
    request_id: RequestId,
    result_rx: oneshot::Receiver<OrderResult>,
    orders: Arc<PendingOrders>,
}

impl PendingTicket {
    /// Request id of this order.
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Wait for the outcome, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Timeout`] if nothing arrived in time, the
    /// delivered error if the order failed, or
    /// [`OrderError::BrokerUnavailable`] if the session went away.
    pub async fn wait(self, timeout: Duration) -> OrderResult {
        let deadline = tokio::time::Instant::now() + timeout;
        self.wait_until(deadline, timeout).await
    }

    /// Wait for the outcome until `deadline`.
    ///
    /// `timeout` is the caller's overall budget and is what a
    /// [`OrderError::Timeout`] reports.
    ///
    /// # Errors
    ///
    /// Same as [`PendingTicket::wait`].
    pub async fn wait_until(
        mut self,
        deadline: tokio::time::Instant,
        timeout: Duration,
    ) -> OrderResult {
        match tokio::time::timeout_at(deadline, &mut self.result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(session_gone()),
            Err(_) => {
                if self.orders.abandon(&self.request_id) {
                    return Err(OrderError::Timeout(timeout));
                }
                // lost the race: the result was sent under the table lock
                self.result_rx.try_recv().unwrap_or_else(|_| Err(session_gone()))
            }
        }
    }
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.orders.abandon(&self.request_id);
    }
}

fn session_gone() -> OrderError {
    OrderError::BrokerUnavailable("session closed".to_string())
}
