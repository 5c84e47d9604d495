//! Domain Layer - Orders, the webhook translator, and the session state machine.
//!
//! Nothing in this layer performs I/O. Types here are shared by the
//! application services and the infrastructure adapters.

/// Market order requests, acknowledgements and rejections.
pub mod order;

/// Broker session state machine.
pub mod session;

/// Webhook payload to order translation.
pub mod translator;
