//! HTTP routes.

pub mod graphql;
pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry::metrics_handler;

/// Assemble the full API router.
///
/// - /graphql - GraphQL endpoint (POST) and GraphiQL (GET)
/// - /health - liveness and readiness checks
/// - /metrics - Prometheus metrics
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .nest("/graphql", graphql::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
