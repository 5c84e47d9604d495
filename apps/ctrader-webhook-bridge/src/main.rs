//! cTrader Webhook Bridge Binary
//!
//! Starts the webhook server and the broker session.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ctrader-webhook-bridge -- [--debug] [--test] [--port 5000]
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `AUTH_TOKEN`: Shared secret expected in `?token=` on `/webhook`
//! - `APP_CLIENT_ID`, `APP_CLIENT_SECRET`: cTrader application credentials
//! - `ACCESS_TOKEN`: cTrader OAuth access token
//! - `ACCOUNT_ID`: cTrader trading account id
//!
//! The broker credentials are optional with `--test`.
//!
//! ## Optional
//! - `HOST_TYPE`: demo | live (default: demo)
//! - `PORT`: HTTP port (default: 5000)
//! - `ORDER_TIMEOUT_SECS`: Broker confirmation timeout (default: 10)
//! - `CTRADER_WS_URL`: Override the broker endpoint
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ctrader_webhook_bridge::infrastructure::ctrader::{
    CTraderClient, SessionManager, SessionManagerConfig,
};
use ctrader_webhook_bridge::infrastructure::http::{AppState, HttpServer};
use ctrader_webhook_bridge::{
    BridgeConfig, Cli, OrderSession, TelemetryConfig, TestModeSession, init_metrics,
    init_telemetry,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long the broker session may take to close after a signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    load_dotenv();

    let _telemetry_guard = init_telemetry(TelemetryConfig::from_env(cli.debug))
        .context("failed to initialize telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting cTrader webhook bridge");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let mut config = BridgeConfig::from_env(cli.test).context("invalid configuration")?;
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let (session, session_task): (Arc<dyn OrderSession>, Option<JoinHandle<()>>) =
        if config.test_mode {
            tracing::warn!("Test mode: orders are acknowledged locally, no broker connection");
            (Arc::new(TestModeSession::new()), None)
        } else {
            let (handle, task) = SessionManager::spawn(
                SessionManagerConfig::from_bridge_config(&config),
                CTraderClient::new().with_write_timeout(config.session.write_timeout),
                shutdown_token.clone(),
            );
            (Arc::new(handle), Some(task))
        };

    let state = Arc::new(AppState::new(
        session,
        config.auth.auth_token(),
        config.server.order_timeout,
    ));
    let http_server = HttpServer::new(config.server.port, state, shutdown_token.clone());
    let server_task = tokio::spawn(http_server.run());

    tokio::select! {
        () = await_shutdown(shutdown_token.clone()) => {}
        result = server_task => {
            shutdown_token.cancel();
            if let Some(task) = session_task {
                let _ = task.await;
            }
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("HTTP server failed"),
                Err(e) => Err(e).context("HTTP server task panicked"),
            };
        }
    }

    if let Some(task) = session_task
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err()
    {
        tracing::warn!("Broker session did not stop in time");
    }

    tracing::info!("cTrader webhook bridge stopped");
    Ok(())
}

/// Load the nearest `.env`, searching upward from the working directory.
fn load_dotenv() {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if let Some(path) = cwd
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|path| path.is_file())
    {
        let _ = dotenvy::from_path(path);
    }
}

fn log_config(config: &BridgeConfig) {
    tracing::info!(
        host_type = config.auth.host_type().as_str(),
        account_id = config.auth.account_id(),
        port = config.server.port,
        test_mode = config.test_mode,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.ws_url(),
        order_timeout_secs = config.server.order_timeout.as_secs(),
        max_auth_failures = config.session.max_auth_failures,
        "Broker session settings"
    );
}

/// Resolve on SIGINT or SIGTERM and cancel `shutdown_token`.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal_name = tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    };

    tracing::info!(
        signal = signal_name,
        drain_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Shutting down"
    );
    shutdown_token.cancel();
}
