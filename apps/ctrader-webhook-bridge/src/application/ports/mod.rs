//! Port Interfaces
//!
//! Contracts between the application core and the outside world, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driver Ports (Inbound)
//!
//! - `OrderSession`: used by the webhook pipeline to submit orders
//!
//! ## Driven Ports (Outbound)
//!
//! - `BrokerClient`: streaming connection to the broker

mod broker_client_port;
mod order_session_port;

pub use broker_client_port::{BrokerClient, BrokerClientError, BrokerEvent};
pub use order_session_port::{OrderError, OrderSession};

#[cfg(test)]
pub use order_session_port::MockOrderSession;
