//! Tracing Subscriber Initialization
//!
//! Sets up the global `tracing` subscriber: an `EnvFilter` read from
//! `PENNANT_LOG` (falling back to `RUST_LOG`, then a built-in default) and a
//! JSON or plain-text formatter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "pennant_api=debug,pennant_storage=info,tower_http=debug,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,
    /// Filter directives; `None` uses `RUST_LOG` or the default
    pub log_filter: Option<String>,
    /// Emit JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pennant-api".to_string(),
            log_filter: None,
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("PENNANT_SERVICE_NAME")
                .unwrap_or_else(|_| "pennant-api".to_string()),
            log_filter: std::env::var("PENNANT_LOG").ok(),
            json_logs: std::env::var("PENNANT_LOG_FORMAT")
                .map(|s| s.to_lowercase() != "text")
                .unwrap_or(true),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.log_filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
                eprintln!("Ignoring invalid PENNANT_LOG ({}), using defaults", e);
                EnvFilter::new(DEFAULT_FILTER)
            }),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup, before anything logs. A second call fails.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter = config.env_filter();

    let result = if config.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .try_init()
    };
    result.map_err(|e| {
        ApiError::internal_error(format!("Failed to initialize tracing subscriber: {}", e))
    })?;

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        "Tracing initialized"
    );

    Ok(())
}
