//! Metrics wrapper recording duration and outcome of every step call

use super::{Resource, ResourceError};
use crate::controller::context::RunContext;
use crate::server::metrics::SharedMetrics;
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

pub struct Instrumented<K> {
    inner: Box<dyn Resource<K>>,
    metrics: Option<SharedMetrics>,
}

impl<K: Send + Sync + 'static> Instrumented<K> {
    pub fn new(inner: Box<dyn Resource<K>>, metrics: Option<SharedMetrics>) -> Self {
        Instrumented { inner, metrics }
    }

    fn record(&self, run: &RunContext, result: &Result<(), ResourceError>, started: Instant) {
        let outcome = match result {
            Err(_) => "error",
            Ok(()) if run.is_canceled() => "canceled",
            Ok(()) => "success",
        };
        let elapsed = started.elapsed().as_secs_f64();

        debug!(
            resource = %self.inner.name(),
            outcome = outcome,
            duration_secs = elapsed,
            "Step finished"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_resource(self.inner.name(), outcome, elapsed);
        }
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> Resource<K> for Instrumented<K> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let started = Instant::now();
        let result = self.inner.ensure_created(run, obj).await;
        self.record(run, &result, started);
        result
    }

    async fn ensure_deleted(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let started = Instant::now();
        let result = self.inner.ensure_deleted(run, obj).await;
        self.record(run, &result, started);
        result
    }
}
