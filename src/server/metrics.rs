//! Prometheus metrics for the strato operator
//!
//! - Resource set runs by outcome
//! - Pipeline step executions and durations
//! - Network range allocations

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Operator metrics registry
///
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct OperatorMetrics {
    registry: Registry,
    /// Resource set runs by set and result (completed, canceled, skipped, error)
    pub reconciliations_total: IntCounterVec,
    /// Step executions by resource and result (success, error, canceled)
    pub resource_executions_total: IntCounterVec,
    /// Step duration in seconds, retries included
    pub resource_duration_seconds: HistogramVec,
    /// Ranges handed out by the allocator, per target kind
    pub ipam_allocations_total: IntCounterVec,
}

impl OperatorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations_total = IntCounterVec::new(
            Opts::new(
                "strato_reconciliations_total",
                "Total number of resource set runs",
            ),
            &["set", "result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let resource_executions_total = IntCounterVec::new(
            Opts::new(
                "strato_resource_executions_total",
                "Total number of pipeline step executions",
            ),
            &["resource", "result"],
        )?;
        registry.register(Box::new(resource_executions_total.clone()))?;

        let resource_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "strato_resource_duration_seconds",
                "Duration of pipeline step executions in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["resource"],
        )?;
        registry.register(Box::new(resource_duration_seconds.clone()))?;

        let ipam_allocations_total = IntCounterVec::new(
            Opts::new(
                "strato_ipam_allocations_total",
                "Total number of allocated network ranges",
            ),
            &["target"],
        )?;
        registry.register(Box::new(ipam_allocations_total.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            resource_executions_total,
            resource_duration_seconds,
            ipam_allocations_total,
        })
    }

    /// Record the outcome of one resource set run
    pub fn record_reconciliation(&self, set: &str, result: &str) {
        self.reconciliations_total
            .with_label_values(&[set, result])
            .inc();
    }

    /// Record one step execution
    pub fn record_resource(&self, resource: &str, result: &str, duration_secs: f64) {
        self.resource_executions_total
            .with_label_values(&[resource, result])
            .inc();
        self.resource_duration_seconds
            .with_label_values(&[resource])
            .observe(duration_secs);
    }

    pub fn record_ipam_allocation(&self, target: &str) {
        self.ipam_allocations_total
            .with_label_values(&[target])
            .inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle for use across the operator
pub type SharedMetrics = Arc<OperatorMetrics>;

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(OperatorMetrics::new()?))
}
