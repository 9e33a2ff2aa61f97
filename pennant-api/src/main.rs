//! Pennant API Server Entry Point
//!
//! Bootstraps configuration and backends, and starts the Axum HTTP server.

use axum::Router;
use pennant_api::{build_app_state, create_api_router, ApiConfig, ApiError, ApiResult};

use pennant_api::telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let addr = api_config.bind_addr()?;
    tracing::info!(
        store = ?api_config.store_backend,
        cache = ?api_config.cache_backend,
        tracing = api_config.tracing_enabled,
        "Loaded configuration"
    );

    let state = build_app_state(api_config)?;
    let app: Router = create_api_router(state);

    tracing::info!(%addr, "Starting Pennant API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
