//! Prometheus Metrics Definitions
//!
//! Process-wide counters for GraphQL requests. Store and cache counters are
//! the sum of every request's [`StatsSnapshot`], so they line up with the
//! `dataFetchingStats` extension clients see.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use pennant_storage::StatsSnapshot;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// GraphQL request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
const REQUEST_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<PennantMetrics>> = Lazy::new(PennantMetrics::new);

/// How a GraphQL request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// No errors in the response
    Ok,
    /// Data returned alongside at least one error
    Error,
    /// Request deadline expired
    Timeout,
}

impl RequestOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            RequestOutcome::Ok => "ok",
            RequestOutcome::Error => "error",
            RequestOutcome::Timeout => "timeout",
        }
    }
}

/// Container for all Pennant metrics.
#[derive(Clone)]
pub struct PennantMetrics {
    /// GraphQL request counter - labels: status
    pub graphql_requests_total: CounterVec,

    /// GraphQL request duration histogram - labels: status
    pub graphql_request_duration_seconds: HistogramVec,

    /// Record store round trips
    pub store_calls_total: IntCounter,

    /// Cache read calls
    pub cache_gets_total: IntCounter,

    /// Cache write calls
    pub cache_sets_total: IntCounter,
}

impl PennantMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            graphql_requests_total: register_counter_vec!(
                "pennant_graphql_requests_total",
                "Total number of GraphQL requests",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register graphql_requests_total: {}", e)))?,

            graphql_request_duration_seconds: register_histogram_vec!(
                "pennant_graphql_request_duration_seconds",
                "GraphQL request duration in seconds",
                &["status"],
                REQUEST_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register graphql_request_duration_seconds: {}", e)))?,

            store_calls_total: register_int_counter!(
                "pennant_store_calls_total",
                "Total number of record store round trips"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register store_calls_total: {}", e)))?,

            cache_gets_total: register_int_counter!(
                "pennant_cache_gets_total",
                "Total number of cache read calls"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_gets_total: {}", e)))?,

            cache_sets_total: register_int_counter!(
                "pennant_cache_sets_total",
                "Total number of cache write calls"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_sets_total: {}", e)))?,
        })
    }

    /// Record a finished GraphQL request and the data fetching it caused.
    pub fn record_request(&self, outcome: RequestOutcome, stats: &StatsSnapshot, elapsed: Duration) {
        let status = outcome.as_label();
        self.graphql_requests_total.with_label_values(&[status]).inc();
        self.graphql_request_duration_seconds
            .with_label_values(&[status])
            .observe(elapsed.as_secs_f64());

        self.store_calls_total.inc_by(stats.sql_calls);
        self.cache_gets_total.inc_by(stats.cache_gets);
        self.cache_sets_total.inc_by(stats.cache_sets);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
