//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/ready - Record store and cache check

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use pennant_core::EntityKind;
use pennant_storage::CacheStats;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::{AppState, SharedCache, SharedStore};

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub store: ComponentHealth,
    pub cache: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_stats: Option<CacheStats>,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy(started: Instant) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        }
    }

    fn failed(status: HealthStatus, error: String) -> Self {
        Self {
            status,
            latency_ms: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping
pub async fn ping() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        details: None,
    })
}

/// GET /health/ready
///
/// The store is required; a failing cache only degrades the service since
/// repositories fall back to the store.
pub async fn ready(
    State(store): State<SharedStore>,
    State(cache): State<SharedCache>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let started = Instant::now();
    let store_health = match store.list_ids(EntityKind::Campaign, 1).await {
        Ok(_) => ComponentHealth::healthy(started),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            ComponentHealth::failed(HealthStatus::Unhealthy, e.to_string())
        }
    };

    let started = Instant::now();
    let (cache_health, cache_stats) = match cache.stats().await {
        Ok(stats) => (ComponentHealth::healthy(started), Some(stats)),
        Err(e) => {
            tracing::warn!(error = %e, "Cache health check failed");
            (ComponentHealth::failed(HealthStatus::Degraded, e.to_string()), None)
        }
    };

    let status = match (store_health.status, cache_health.status) {
        (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
        (HealthStatus::Healthy, _) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    };
    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status,
        details: Some(HealthDetails {
            store: store_health,
            cache: cache_health,
            cache_stats,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
        }),
    };
    (code, Json(response))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the health check router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/ready", get(ready))
}
