//! Configuration Module
//!
//! Environment and command-line configuration for the bridge service.

mod cli;
mod settings;

pub use cli::Cli;
pub use settings::{
    AuthConfig, BridgeConfig, ConfigError, DEMO_WS_URL, HostType, LIVE_WS_URL, ServerSettings,
    SessionSettings,
};
