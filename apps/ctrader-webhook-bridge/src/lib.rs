#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::items_after_statements
    )
)]

//! cTrader Webhook Bridge - TradingView alerts to cTrader market orders
//!
//! An HTTP service that receives webhook alerts and places the market
//! orders they describe over one long-lived, authenticated cTrader Open API
//! WebSocket session.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Order, session and translation rules
//!   - `order`: Market orders, acknowledgements, rejections
//!   - `session`: Session state machine and status snapshot
//!   - `translator`: Webhook payload validation
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Order session and broker client interfaces
//!   - `services`: Pending order correlation, offline test-mode session
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ctrader`: WebSocket client, codec and session manager
//!   - `http`: Webhook and health endpoints
//!   - `config`: Environment and CLI configuration
//!   - `metrics` / `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//! TradingView ──POST /webhook──► HTTP pipeline ──► SessionHandle
//!                                     ▲                  │ mpsc
//!                                     │ oneshot          ▼
//!                                     └────────── SessionManager ◄──► cTrader WS
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order and session types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::order::{
    BAD_VOLUME_CODE, BrokerRejection, ExecutionStatus, OrderAck, OrderRequest, RequestId,
    TradeSide,
};
pub use domain::session::{SessionState, SessionStatus};
pub use domain::translator::{ValidationError, WebhookPayload, translate};

// Ports and services
pub use application::ports::{BrokerClient, BrokerEvent, OrderError, OrderSession};
pub use application::services::{PendingOrders, TestModeSession};

// Infrastructure config
pub use infrastructure::config::{
    AuthConfig, BridgeConfig, Cli, ConfigError, HostType, ServerSettings, SessionSettings,
};

// Broker session
pub use infrastructure::ctrader::{
    CTraderClient, MockBrokerClient, MockBrokerControl, SessionHandle, SessionManager,
    SessionManagerConfig,
};

// HTTP
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, create_router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryGuard, init_with_config as init_telemetry,
};
