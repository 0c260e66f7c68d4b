//! Resource pipeline executor
//!
//! A `Resource` is one idempotent step of a reconciliation: it converges a
//! single piece of infrastructure towards the declared object, or tears it
//! down. Steps are built once at startup and shared by all runs, so they
//! never keep per-run state; whatever a later step needs goes into the
//! `RunContext`.
//!
//! Steps are composed into a `ResourceSet`, which wraps every step with
//! retries and metrics and runs them in order.

pub mod crud;
pub mod instrumented;
pub mod retry;
pub mod set;

pub use crud::{Crud, CrudResource, Patch};
pub use instrumented::Instrumented;
pub use retry::{RetryConfig, Retrying};
pub use set::{Outcome, PipelineError, ResourceSet};

use super::context::{ContextError, RunContext};
use crate::cloud::template::TemplateError;
use crate::cloud::CloudError;
use crate::ipam::IpamError;
use crate::store::StoreError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ipam(#[from] IpamError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl ResourceError {
    /// Whether running the step again can succeed
    ///
    /// Configuration errors and a missing context fail the same way every
    /// time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ResourceError::InvalidConfig(_)
                | ResourceError::Context(_)
                | ResourceError::Template(_)
                | ResourceError::Ipam(IpamError::InvalidConfig(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ResourceError::NotFound(_) => true,
            ResourceError::Cloud(e) => e.is_not_found(),
            ResourceError::Store(StoreError::NotFound(_)) => true,
            _ => false,
        }
    }
}

/// One step of a resource set
#[async_trait]
pub trait Resource<K: Send + Sync + 'static>: Send + Sync {
    /// Stable name used in logs and metrics
    fn name(&self) -> &str;

    /// Converge towards the declared object
    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError>;

    /// Tear down what `ensure_created` converged
    async fn ensure_deleted(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError>;
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
#[path = "resource_test.rs"]
mod tests;
