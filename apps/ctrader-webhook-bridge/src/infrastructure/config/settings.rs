//! Bridge Configuration Settings
//!
//! Configuration types for the webhook bridge, loaded from environment
//! variables once at startup and read-only afterwards.

use std::time::Duration;

/// cTrader demo Open API endpoint (JSON).
pub const DEMO_WS_URL: &str = "wss://demo.ctraderapi.com:5036";

/// cTrader live Open API endpoint (JSON).
pub const LIVE_WS_URL: &str = "wss://live.ctraderapi.com:5036";

/// cTrader environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostType {
    /// Demo accounts.
    #[default]
    Demo,
    /// Live accounts (real money).
    Live,
}

impl HostType {
    /// Parse `demo` or `live`, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Some(Self::Demo),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the host type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Live => "live",
        }
    }

    /// Open API WebSocket endpoint for this environment.
    #[must_use]
    pub const fn ws_url(&self) -> &'static str {
        match self {
            Self::Demo => DEMO_WS_URL,
            Self::Live => LIVE_WS_URL,
        }
    }
}

/// Broker credentials and the webhook shared secret.
#[derive(Clone)]
pub struct AuthConfig {
    host_type: HostType,
    client_id: String,
    client_secret: String,
    access_token: String,
    account_id: i64,
    auth_token: String,
}

impl AuthConfig {
    /// Create new auth configuration.
    #[must_use]
    pub const fn new(
        host_type: HostType,
        client_id: String,
        client_secret: String,
        access_token: String,
        account_id: i64,
        auth_token: String,
    ) -> Self {
        Self {
            host_type,
            client_id,
            client_secret,
            access_token,
            account_id,
            auth_token,
        }
    }

    /// Broker environment.
    #[must_use]
    pub const fn host_type(&self) -> HostType {
        self.host_type
    }

    /// Open API application client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Open API application client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// OAuth access token for the trading account.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// cTrader trading account id (`ctidTraderAccountId`).
    #[must_use]
    pub const fn account_id(&self) -> i64 {
        self.account_id
    }

    /// Shared secret expected in the webhook `token` query parameter.
    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("host_type", &self.host_type)
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

/// Broker session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound for the transport handshake.
    pub connect_timeout: Duration,
    /// Upper bound for each authentication step.
    pub auth_timeout: Duration,
    /// Upper bound for a single outbound write to the broker.
    pub write_timeout: Duration,
    /// Interval between outbound heartbeats.
    pub heartbeat_interval: Duration,
    /// Inbound silence after which the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Delay after the first connection failure.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection jitter as a fraction (0 = disabled).
    pub reconnect_jitter: f64,
    /// Consecutive credential rejections before the session degrades.
    pub max_auth_failures: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_jitter: 0.0,
            max_auth_failures: 3,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen port for the webhook and health endpoints.
    pub port: u16,
    /// Time a webhook waits for the broker's answer.
    pub order_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5000,
            order_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Credentials and webhook secret.
    pub auth: AuthConfig,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Broker session settings.
    pub session: SessionSettings,
    /// Endpoint override (`CTRADER_WS_URL`).
    pub ws_url_override: Option<String>,
    /// Offline mode: no broker connection.
    pub test_mode: bool,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// In test mode only `AUTH_TOKEN` is required.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing,
    /// empty, or unparseable.
    pub fn from_env(test_mode: bool) -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok(), test_mode)
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BridgeConfig::from_env`].
    pub fn from_source<F>(lookup: F, test_mode: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_token = required(&lookup, "AUTH_TOKEN")?;

        let host_type = parse_host_type(lookup("HOST_TYPE"))?;

        let (client_id, client_secret, access_token, account_id) = if test_mode {
            (
                lookup("APP_CLIENT_ID").unwrap_or_default(),
                lookup("APP_CLIENT_SECRET").unwrap_or_default(),
                lookup("ACCESS_TOKEN").unwrap_or_default(),
                lookup("ACCOUNT_ID")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or_default(),
            )
        } else {
            (
                required(&lookup, "APP_CLIENT_ID")?,
                required(&lookup, "APP_CLIENT_SECRET")?,
                required(&lookup, "ACCESS_TOKEN")?,
                parse_account_id(&required(&lookup, "ACCOUNT_ID")?)?,
            )
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            port: parse_env_u16(&lookup, "PORT", server_defaults.port),
            order_timeout: parse_env_duration_secs(
                &lookup,
                "ORDER_TIMEOUT_SECS",
                server_defaults.order_timeout,
            ),
        };

        let session_defaults = SessionSettings::default();
        let session = SessionSettings {
            connect_timeout: parse_env_duration_secs(
                &lookup,
                "CONNECT_TIMEOUT_SECS",
                session_defaults.connect_timeout,
            ),
            auth_timeout: parse_env_duration_secs(
                &lookup,
                "AUTH_TIMEOUT_SECS",
                session_defaults.auth_timeout,
            ),
            write_timeout: parse_env_duration_secs(
                &lookup,
                "WRITE_TIMEOUT_SECS",
                session_defaults.write_timeout,
            ),
            heartbeat_interval: parse_env_duration_secs(
                &lookup,
                "HEARTBEAT_INTERVAL_SECS",
                session_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                &lookup,
                "HEARTBEAT_TIMEOUT_SECS",
                session_defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                &lookup,
                "RECONNECT_DELAY_INITIAL_MS",
                session_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &lookup,
                "RECONNECT_DELAY_MAX_SECS",
                session_defaults.reconnect_delay_max,
            ),
            reconnect_jitter: parse_env_f64(
                &lookup,
                "RECONNECT_JITTER",
                session_defaults.reconnect_jitter,
            )
            .clamp(0.0, 1.0),
            max_auth_failures: parse_env_u32(
                &lookup,
                "MAX_AUTH_FAILURES",
                session_defaults.max_auth_failures,
            )
            .max(1),
        };

        let ws_url_override = lookup("CTRADER_WS_URL").filter(|v| !v.trim().is_empty());

        Ok(Self {
            auth: AuthConfig::new(
                host_type,
                client_id,
                client_secret,
                access_token,
                account_id,
                auth_token,
            ),
            server,
            session,
            ws_url_override,
            test_mode,
        })
    }

    /// Override the listen port (from `--port`).
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Open API endpoint to connect to.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        self.ws_url_override
            .as_deref()
            .unwrap_or_else(|| self.auth.host_type().ws_url())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for environment variable {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong.
        reason: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_host_type(value: Option<String>) -> Result<HostType, ConfigError> {
    match value {
        None => Ok(HostType::default()),
        Some(value) if value.trim().is_empty() => Ok(HostType::default()),
        Some(value) => HostType::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
            key: "HOST_TYPE".to_string(),
            reason: format!("expected 'demo' or 'live', got '{}'", value.trim()),
        }),
    }
}

fn parse_account_id(value: &str) -> Result<i64, ConfigError> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ConfigError::InvalidValue {
            key: "ACCOUNT_ID".to_string(),
            reason: "must be a positive integer".to_string(),
        }),
    }
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64<F>(lookup: &F, key: &str, default: f64) -> f64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map_or(default, Duration::from_millis)
}
