//! HTTP server for probes and metrics
//!
//! - `/healthz` - Liveness probe (process is running)
//! - `/readyz` - Readiness probe (controllers are running)
//! - `/metrics` - Prometheus metrics

mod health;
pub mod metrics;

pub use health::{run_health_server, ReadinessState};
pub use metrics::{create_metrics, OperatorMetrics, SharedMetrics};

#[cfg(test)]
#[path = "health_test.rs"]
mod tests;

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_tests;
