//! Allocation targets backed by the object store
//!
//! Clusters and node pools draw from the same pool, so the collector reads
//! the ranges of both kinds.

use super::{Checker, Collector, IpamError, Persister};
use crate::controller::resources::InfraTarget;
use crate::crd::cluster::TenantCluster;
use crate::crd::node_pool::NodePool;
use crate::store::ObjectStore;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

/// Eligible when the object still exists, is not being deleted and has no range
pub struct StatusChecker<K> {
    store: Arc<dyn ObjectStore<K>>,
}

impl<K> StatusChecker<K> {
    pub fn new(store: Arc<dyn ObjectStore<K>>) -> Self {
        StatusChecker { store }
    }
}

fn needs_range<K: InfraTarget>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_none() && obj.network_cidr().is_none()
}

#[async_trait]
impl<K: InfraTarget> Checker<K> for StatusChecker<K> {
    async fn check(&self, obj: &K) -> Result<bool, IpamError> {
        if !needs_range(obj) {
            return Ok(false);
        }
        // The triggering copy may be stale, read the object again
        match self.store.get(obj).await? {
            Some(fresh) => Ok(needs_range(&fresh)),
            None => {
                debug!(object = %obj.name_any(), "Object gone, skipping allocation");
                Ok(false)
            }
        }
    }
}

/// Writes the range to `status.network.cidr`
pub struct StatusPersister<K> {
    store: Arc<dyn ObjectStore<K>>,
}

impl<K> StatusPersister<K> {
    pub fn new(store: Arc<dyn ObjectStore<K>>) -> Self {
        StatusPersister { store }
    }
}

#[async_trait]
impl<K: InfraTarget> Persister<K> for StatusPersister<K> {
    async fn persist(&self, obj: &K, subnet: Ipv4Net) -> Result<(), IpamError> {
        let status = serde_json::json!({ "network": { "cidr": subnet.to_string() } });
        self.store.patch_status(obj, status).await?;
        Ok(())
    }
}

/// Ranges recorded on every cluster and node pool
pub struct PoolCollector {
    clusters: Arc<dyn ObjectStore<TenantCluster>>,
    node_pools: Arc<dyn ObjectStore<NodePool>>,
}

impl PoolCollector {
    pub fn new(
        clusters: Arc<dyn ObjectStore<TenantCluster>>,
        node_pools: Arc<dyn ObjectStore<NodePool>>,
    ) -> Self {
        PoolCollector {
            clusters,
            node_pools,
        }
    }
}

fn parse_recorded(name: &str, cidr: &str) -> Result<Ipv4Net, IpamError> {
    cidr.parse().map_err(|_| {
        IpamError::ExecutionFailed(format!("{} records malformed range {:?}", name, cidr))
    })
}

#[async_trait]
impl Collector for PoolCollector {
    async fn collect(&self) -> Result<Vec<Ipv4Net>, IpamError> {
        let mut allocated = Vec::new();

        for cluster in self.clusters.list().await? {
            if let Some(cidr) = cluster.network_cidr() {
                allocated.push(parse_recorded(&cluster.name_any(), cidr)?);
            }
        }
        for pool in self.node_pools.list().await? {
            if let Some(cidr) = pool.network_cidr() {
                allocated.push(parse_recorded(&pool.name_any(), cidr)?);
            }
        }

        debug!(count = allocated.len(), "Collected allocated ranges");
        Ok(allocated)
    }
}
