//! Tracing and OpenTelemetry Integration
//!
//! Installs the `tracing` subscriber: human-readable log lines on stdout,
//! plus an optional OTLP span exporter for distributed tracing.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives (ignored with `--debug`)
//! - `OTEL_ENABLED`: Set to "true" to export spans (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: ctrader-webhook-bridge)
//!
//! # Usage
//!
//! ```ignore
//! use ctrader_webhook_bridge::infrastructure::telemetry::{self, TelemetryConfig};
//!
//! // keep the guard alive for the lifetime of the process
//! let _guard = telemetry::init_with_config(TelemetryConfig::from_env(false))?;
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Service name for OpenTelemetry traces.
const DEFAULT_SERVICE_NAME: &str = "ctrader-webhook-bridge";

/// Default OTLP endpoint.
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Guard that shuts down OpenTelemetry when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.tracer_provider.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            eprintln!("OTLP span flush on exit failed: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether spans are exported over OTLP.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
    /// Log this crate at debug level regardless of `RUST_LOG`.
    pub debug: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.into(),
            service_name: DEFAULT_SERVICE_NAME.into(),
            debug: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env(debug: bool) -> Self {
        let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());

        Self {
            enabled: var("OTEL_ENABLED", "false").eq_ignore_ascii_case("true"),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_OTLP_ENDPOINT),
            service_name: var("OTEL_SERVICE_NAME", DEFAULT_SERVICE_NAME),
            debug,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let defaults = default_directives(self.debug);
        if self.debug {
            return EnvFilter::new(defaults);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(defaults))
    }
}

fn default_directives(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!("ctrader_webhook_bridge={level},tower_http=info,hyper=warn,tungstenite=warn")
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit so buffered spans are flushed.
///
/// # Errors
///
/// Returns [`ExporterBuildError`] if OTLP export is enabled and the exporter
/// cannot be created.
pub fn init_with_config(config: TelemetryConfig) -> Result<TelemetryGuard, ExporterBuildError> {
    let tracer_provider = if config.enabled {
        Some(build_tracer_provider(&config)?)
    } else {
        None
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(otel_layer)
        .init();

    if config.enabled {
        tracing::info!(endpoint = %config.otlp_endpoint, "Exporting spans over OTLP");
    }

    Ok(TelemetryGuard { tracer_provider })
}

fn build_tracer_provider(
    config: &TelemetryConfig,
) -> Result<SdkTracerProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

// =============================================================================
// Tests
// =============================================================================
