//! Application Layer - Use cases and port definitions.
//!
//! Ports describe what the webhook pipeline needs from a broker session
//! and what a session needs from a broker transport. Services hold the
//! broker-independent logic shared by every session implementation.

/// Port interfaces for the order session and the broker transport.
pub mod ports;

/// Pending order correlation and the offline test-mode session.
pub mod services;
