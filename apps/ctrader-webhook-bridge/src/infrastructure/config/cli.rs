//! Command-Line Arguments

use clap::Parser;

/// CLI arguments for the webhook bridge.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ctrader-webhook-bridge")]
#[command(about = "TradingView webhook to cTrader market order bridge")]
#[command(version)]
pub struct Cli {
    /// Enable debug-level logging
    #[arg(long)]
    pub debug: bool,

    /// Run without a broker connection; orders are acknowledged locally
    #[arg(long)]
    pub test: bool,

    /// HTTP listen port (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,
}
