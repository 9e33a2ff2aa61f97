//! Pennant Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing-subscriber` and process-wide
//! Prometheus metrics fed from each request's data fetching stats.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, PennantMetrics, RequestOutcome, METRICS};
pub use tracer::{init_tracing, TelemetryConfig};
