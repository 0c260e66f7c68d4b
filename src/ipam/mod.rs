//! Subnet allocation (IPAM)
//!
//! Clusters and node pools each get a range of a fixed prefix length from a
//! shared network. Per target the allocator moves through:
//!
//! 1. check - skip objects being deleted or already carrying a range
//! 2. collect - read every range allocated from the pool, never cached
//! 3. allocate - first free range in ascending order
//! 4. persist - write the range onto the object's status
//!
//! Collect, allocate and persist run under a lock keyed by the pool, so two
//! reconciliations never hand out the same range.

pub mod lock;
pub mod split;
pub mod targets;

use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use crate::server::metrics::SharedMetrics;
use crate::store::StoreError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use lock::Locker;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Smallest subnet the cloud provider accepts
pub const MIN_SUBNET_PREFIX: u8 = 28;

#[derive(Debug, Error)]
pub enum IpamError {
    #[error("invalid IPAM config: {0}")]
    InvalidConfig(String),

    #[error("IPAM invariant violated: {0}")]
    ExecutionFailed(String),

    #[error("IPAM lock error: {0}")]
    Lock(String),

    #[error("IPAM store error: {0}")]
    Store(#[from] StoreError),
}

/// True when the two ranges share at least one address
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Pick the first range of `prefix_len` in `network` that overlaps no allocated range
///
/// Candidates are scanned in ascending order, so the result only depends on
/// the set of allocated ranges.
pub fn free_subnet(
    network: Ipv4Net,
    prefix_len: u8,
    allocated: &[Ipv4Net],
) -> Result<Ipv4Net, IpamError> {
    let mut candidates = network.subnets(prefix_len).map_err(|_| {
        IpamError::InvalidConfig(format!(
            "prefix length {} does not fit into {}",
            prefix_len, network
        ))
    })?;

    candidates
        .find(|candidate| !allocated.iter().any(|a| overlaps(candidate, a)))
        .ok_or_else(|| {
            IpamError::InvalidConfig(format!(
                "network {} has no free /{} range left",
                network, prefix_len
            ))
        })
}

/// Pool and range size of one allocation target kind
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IpamConfig {
    /// Shared network all ranges are taken from
    pub network: Ipv4Net,
    /// Prefix length of every allocated range
    pub prefix_len: u8,
    /// Prefix bits the range is split further by (zones, public/private)
    pub split_bits: u8,
}

impl IpamConfig {
    /// Check the prefix lengths fit the network and the minimum subnet size
    pub fn validate(&self) -> Result<(), IpamError> {
        if self.prefix_len < self.network.prefix_len() {
            return Err(IpamError::InvalidConfig(format!(
                "allocation prefix /{} is larger than network {}",
                self.prefix_len, self.network
            )));
        }
        if self.prefix_len > 32 {
            return Err(IpamError::InvalidConfig(format!(
                "allocation prefix /{} is not an IPv4 prefix length",
                self.prefix_len
            )));
        }
        let split_prefix = self.prefix_len.checked_add(self.split_bits);
        if split_prefix.map_or(true, |p| p > MIN_SUBNET_PREFIX) {
            return Err(IpamError::InvalidConfig(format!(
                "allocation prefix /{} split by {} bits is smaller than the minimum subnet /{}",
                self.prefix_len, self.split_bits, MIN_SUBNET_PREFIX
            )));
        }
        Ok(())
    }

    /// Key of the lock guarding this pool
    pub fn lock_key(&self) -> String {
        format!("ipam-{}", self.network)
    }
}

/// Decides whether a target still needs a range
#[async_trait]
pub trait Checker<K>: Send + Sync {
    async fn check(&self, obj: &K) -> Result<bool, IpamError>;
}

/// Reads every range currently allocated from the pool
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<Vec<Ipv4Net>, IpamError>;
}

/// Records an allocated range on the target
#[async_trait]
pub trait Persister<K>: Send + Sync {
    async fn persist(&self, obj: &K, subnet: Ipv4Net) -> Result<(), IpamError>;
}

/// Pipeline step allocating a range for a cluster or node pool
pub struct IpamResource<K> {
    target: &'static str,
    config: IpamConfig,
    checker: Arc<dyn Checker<K>>,
    collector: Arc<dyn Collector>,
    persister: Arc<dyn Persister<K>>,
    locker: Arc<dyn Locker>,
    metrics: Option<SharedMetrics>,
}

impl<K> IpamResource<K> {
    /// Fails with `InvalidConfig` when the config can't produce valid subnets
    pub fn new(
        target: &'static str,
        config: IpamConfig,
        checker: Arc<dyn Checker<K>>,
        collector: Arc<dyn Collector>,
        persister: Arc<dyn Persister<K>>,
        locker: Arc<dyn Locker>,
    ) -> Result<Self, IpamError> {
        config.validate()?;

        Ok(IpamResource {
            target,
            config,
            checker,
            collector,
            persister,
            locker,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl<K: Send + Sync + 'static> IpamResource<K> {
    async fn allocate_and_persist(
        &self,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<(), ResourceError> {
        // Another reconciliation may have persisted a range while we waited for the lock
        if !self.checker.check(obj).await? {
            debug!(kind = self.target, "Range allocated while waiting for lock");
            return Ok(());
        }

        let allocated = self.collector.collect().await?;
        let ctx = run.context_mut()?;

        let subnet = match ctx.status.pending_allocation {
            Some(pending) if !allocated.iter().any(|a| overlaps(&pending, a)) => {
                info!(
                    kind = self.target,
                    cidr = %pending,
                    "Retrying persistence of previously allocated range"
                );
                pending
            }
            pending => {
                if let Some(taken) = pending {
                    warn!(
                        kind = self.target,
                        cidr = %taken,
                        "Previously allocated range was taken meanwhile, allocating again"
                    );
                }
                let subnet = free_subnet(self.config.network, self.config.prefix_len, &allocated)?;
                ctx.status.pending_allocation = Some(subnet);
                subnet
            }
        };

        self.persister.persist(obj, subnet).await?;

        let ctx = run.context_mut()?;
        ctx.status.pending_allocation = None;
        ctx.status.network_cidr = Some(subnet);

        if let Some(metrics) = &self.metrics {
            metrics.record_ipam_allocation(self.target);
        }
        info!(kind = self.target, cidr = %subnet, "Allocated range");

        Ok(())
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> Resource<K> for IpamResource<K> {
    fn name(&self) -> &str {
        "ipam"
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        if !self.checker.check(obj).await? {
            debug!(kind = self.target, "No range allocation needed");
            return Ok(());
        }

        let handle = self.locker.acquire(&self.config.lock_key()).await?;
        let result = self.allocate_and_persist(run, obj).await;
        let released = self.locker.release(handle).await;

        if let (Err(_), Err(e)) = (&result, &released) {
            warn!(
                kind = self.target,
                error = %e,
                "Failed to release lock after failed allocation"
            );
        }
        result?;
        released?;
        Ok(())
    }

    async fn ensure_deleted(&self, _run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        // The range is freed together with the object's status
        Ok(())
    }
}

#[cfg(test)]
#[path = "ipam_test.rs"]
mod tests;
