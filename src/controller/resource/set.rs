//! Ordered composition of pipeline steps
//!
//! Creation runs the steps in list order, deletion in reverse order. All
//! steps of one run share a fresh `RunContext`. A step may cancel the run;
//! the set checks the flag after every step and stops without error.

use super::instrumented::Instrumented;
use super::retry::{RetryConfig, Retrying};
use super::{Resource, ResourceError};
use crate::controller::context::{ReconcileContext, RunContext};
use crate::server::metrics::SharedMetrics;
use thiserror::Error;
use tracing::{debug, info};

/// How a run of a resource set ended, errors aside
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every step ran
    Completed,
    /// A step canceled the run; the next trigger starts over
    Canceled,
    /// The set does not handle this object
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Canceled => "canceled",
            Outcome::Skipped => "skipped",
        }
    }
}

/// A failed run, wrapped with the step that failed
#[derive(Debug, Error)]
#[error("resource {resource} failed: {source}")]
pub struct PipelineError {
    pub resource: String,
    #[source]
    pub source: ResourceError,
}

type HandlesFn<K> = Box<dyn Fn(&K) -> bool + Send + Sync>;
type InitCtxFn<K> = Box<dyn Fn(&K) -> Result<ReconcileContext, ResourceError> + Send + Sync>;

/// Name under which failures of the context hook are reported
const INIT_CTX: &str = "init_ctx";

pub struct ResourceSet<K> {
    name: String,
    resources: Vec<Box<dyn Resource<K>>>,
    handles: HandlesFn<K>,
    init_ctx: InitCtxFn<K>,
    metrics: Option<SharedMetrics>,
}

impl<K: Send + Sync + 'static> ResourceSet<K> {
    /// Wrap every step with retries and metrics
    ///
    /// Handles every object and attaches an empty context until configured
    /// otherwise.
    pub fn new(
        name: &str,
        resources: Vec<Box<dyn Resource<K>>>,
        retry: RetryConfig,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        let resources = resources
            .into_iter()
            .map(|resource| {
                let retrying: Box<dyn Resource<K>> =
                    Box::new(Retrying::new(resource, retry.clone()));
                Box::new(Instrumented::new(retrying, metrics.clone())) as Box<dyn Resource<K>>
            })
            .collect();

        ResourceSet {
            name: name.to_string(),
            resources,
            handles: Box::new(|_| true),
            init_ctx: Box::new(|_| Ok(ReconcileContext::default())),
            metrics,
        }
    }

    pub fn with_handles(mut self, handles: impl Fn(&K) -> bool + Send + Sync + 'static) -> Self {
        self.handles = Box::new(handles);
        self
    }

    pub fn with_init_ctx(
        mut self,
        init_ctx: impl Fn(&K) -> Result<ReconcileContext, ResourceError> + Send + Sync + 'static,
    ) -> Self {
        self.init_ctx = Box::new(init_ctx);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self, obj: &K) -> bool {
        (self.handles)(obj)
    }

    /// Fresh run with a brand-new context attached
    pub fn init_ctx(&self, obj: &K) -> Result<RunContext, PipelineError> {
        let ctx = (self.init_ctx)(obj).map_err(|source| PipelineError {
            resource: INIT_CTX.to_string(),
            source,
        })?;
        Ok(RunContext::new().with_context(ctx))
    }

    /// Step names in creation order
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name()).collect()
    }

    pub async fn ensure_created(&self, obj: &K) -> Result<Outcome, PipelineError> {
        let result = self.run(obj, false).await;
        self.record(&result);
        result
    }

    pub async fn ensure_deleted(&self, obj: &K) -> Result<Outcome, PipelineError> {
        let result = self.run(obj, true).await;
        self.record(&result);
        result
    }

    async fn run(&self, obj: &K, deleting: bool) -> Result<Outcome, PipelineError> {
        if !self.handles(obj) {
            debug!(set = %self.name, "Object not handled by this resource set");
            return Ok(Outcome::Skipped);
        }

        let mut run = self.init_ctx(obj)?;

        let mut steps: Vec<&dyn Resource<K>> = self.resources.iter().map(|r| r.as_ref()).collect();
        if deleting {
            steps.reverse();
        }

        for resource in steps {
            let result = if deleting {
                resource.ensure_deleted(&mut run, obj).await
            } else {
                resource.ensure_created(&mut run, obj).await
            };
            result.map_err(|source| PipelineError {
                resource: resource.name().to_string(),
                source,
            })?;

            if run.is_canceled() {
                info!(
                    set = %self.name,
                    resource = %resource.name(),
                    "Reconciliation canceled"
                );
                return Ok(Outcome::Canceled);
            }
        }

        Ok(Outcome::Completed)
    }

    fn record(&self, result: &Result<Outcome, PipelineError>) {
        let label = match result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation(&self.name, label);
        }
    }
}
