//! Application Services
//!
//! Broker-independent pieces of order handling.
//!
//! - `PendingOrders`: correlates in-flight orders with waiting callers
//! - `TestModeSession`: offline `OrderSession` used with `--test`

mod pending;
mod test_mode;

pub use pending::{OrderResult, PendingOrders, PendingTicket};
pub use test_mode::TestModeSession;
