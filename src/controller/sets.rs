//! Resource set compositions
//!
//! - `cluster` - namespace, discovery, range allocation, zones and the control plane stack
//! - `nodepool` - discovery, range allocation, zones and the node pool stack
//! - `drain` - lifecycle hook handling of node pool workers
//!
//! Every set only handles objects labelled with this operator's version, so
//! two operator versions can run side by side during an upgrade.

use super::context::ReconcileContext;
use super::resource::{Crud, Resource, ResourceError, ResourceSet, RetryConfig};
use super::resources::accountid::AccountIdResource;
use super::resources::asg::AsgResource;
use super::resources::drainer::DrainerResource;
use super::resources::drainfinisher::DrainFinisherResource;
use super::resources::namespace::NamespaceResource;
use super::resources::stack::StackResource;
use super::resources::stackoutput::StackOutputResource;
use super::resources::status::StatusResource;
use super::resources::subnets::SubnetsResource;
use super::resources::vpc::VpcResource;
use super::resources::zones::{NodePoolZonesResource, ZonesResource};
use super::resources::InfraTarget;
use crate::cloud::template::TemplateRenderer;
use crate::cloud::CloudProvider;
use crate::crd::cluster::TenantCluster;
use crate::crd::drainer::DrainerConfig;
use crate::crd::node_pool::NodePool;
use crate::crd::{operator_version_label, OPERATOR_VERSION};
use crate::ipam::lock::Locker;
use crate::ipam::targets::{PoolCollector, StatusChecker, StatusPersister};
use crate::ipam::{IpamConfig, IpamError, IpamResource};
use crate::server::metrics::SharedMetrics;
use crate::store::ObjectStore;
use k8s_openapi::api::core::v1::Namespace;
use std::sync::Arc;

pub const CLUSTER_SET: &str = "cluster";
pub const NODE_POOL_SET: &str = "nodepool";
pub const DRAIN_SET: &str = "drain";

/// Everything the steps talk to
#[derive(Clone)]
pub struct Dependencies {
    pub cloud: Arc<dyn CloudProvider>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub clusters: Arc<dyn ObjectStore<TenantCluster>>,
    pub node_pools: Arc<dyn ObjectStore<NodePool>>,
    pub namespaces: Arc<dyn ObjectStore<Namespace>>,
    pub drainer_configs: Arc<dyn ObjectStore<DrainerConfig>>,
    pub locker: Arc<dyn Locker>,
    pub metrics: Option<SharedMetrics>,
}

/// Tunables of the compositions
#[derive(Clone, Debug)]
pub struct SetsConfig {
    pub cluster_ipam: IpamConfig,
    pub node_pool_ipam: IpamConfig,
    pub retry: RetryConfig,
}

pub struct ResourceSets {
    pub cluster: ResourceSet<TenantCluster>,
    pub node_pool: ResourceSet<NodePool>,
    pub drain: ResourceSet<NodePool>,
}

/// True when the object carries this operator's version label
pub fn handled_by_this_version<K: kube::Resource>(obj: &K) -> bool {
    operator_version_label(obj.meta()) == Some(OPERATOR_VERSION)
}

/// Seed a run with the range recorded on the object
pub fn init_ctx_from_status<K: InfraTarget>(obj: &K) -> Result<ReconcileContext, ResourceError> {
    let mut ctx = ReconcileContext::default();
    if let Some(cidr) = obj.network_cidr() {
        let parsed = cidr.parse().map_err(|_| {
            ResourceError::InvalidConfig(format!("recorded range {:?} is not a CIDR", cidr))
        })?;
        ctx.status.network_cidr = Some(parsed);
    }
    Ok(ctx)
}

fn ipam_step<K: InfraTarget>(
    deps: &Dependencies,
    config: IpamConfig,
    store: Arc<dyn ObjectStore<K>>,
) -> Result<IpamResource<K>, IpamError> {
    let step = IpamResource::new(
        K::KIND,
        config,
        Arc::new(StatusChecker::new(store.clone())),
        Arc::new(PoolCollector::new(
            deps.clusters.clone(),
            deps.node_pools.clone(),
        )),
        Arc::new(StatusPersister::new(store)),
        deps.locker.clone(),
    )?;
    Ok(match &deps.metrics {
        Some(metrics) => step.with_metrics(metrics.clone()),
        None => step,
    })
}

pub fn cluster_set(
    deps: &Dependencies,
    config: &SetsConfig,
) -> Result<ResourceSet<TenantCluster>, IpamError> {
    let steps: Vec<Box<dyn Resource<TenantCluster>>> = vec![
        Box::new(Crud(NamespaceResource::new(deps.namespaces.clone()))),
        Box::new(AccountIdResource::new(deps.cloud.clone())),
        Box::new(VpcResource::new(deps.cloud.clone())),
        Box::new(ipam_step(
            deps,
            config.cluster_ipam,
            deps.clusters.clone(),
        )?),
        Box::new(SubnetsResource::new(deps.cloud.clone())),
        Box::new(ZonesResource::new(deps.node_pools.clone())),
        Box::new(AsgResource::new(deps.cloud.clone())),
        Box::new(StackOutputResource::new(deps.cloud.clone())),
        Box::new(StackResource::new(
            deps.cloud.clone(),
            deps.renderer.clone(),
        )),
        Box::new(StatusResource::new(deps.clusters.clone())),
    ];

    Ok(
        ResourceSet::new(CLUSTER_SET, steps, config.retry.clone(), deps.metrics.clone())
            .with_handles(handled_by_this_version)
            .with_init_ctx(init_ctx_from_status),
    )
}

pub fn node_pool_set(
    deps: &Dependencies,
    config: &SetsConfig,
) -> Result<ResourceSet<NodePool>, IpamError> {
    let steps: Vec<Box<dyn Resource<NodePool>>> = vec![
        Box::new(AccountIdResource::new(deps.cloud.clone())),
        Box::new(VpcResource::new(deps.cloud.clone())),
        Box::new(ipam_step(
            deps,
            config.node_pool_ipam,
            deps.node_pools.clone(),
        )?),
        Box::new(SubnetsResource::new(deps.cloud.clone())),
        Box::new(NodePoolZonesResource),
        Box::new(AsgResource::new(deps.cloud.clone())),
        Box::new(StackOutputResource::new(deps.cloud.clone())),
        Box::new(StackResource::new(
            deps.cloud.clone(),
            deps.renderer.clone(),
        )),
    ];

    Ok(
        ResourceSet::new(NODE_POOL_SET, steps, config.retry.clone(), deps.metrics.clone())
            .with_handles(handled_by_this_version)
            .with_init_ctx(init_ctx_from_status),
    )
}

pub fn drain_set(deps: &Dependencies, config: &SetsConfig) -> ResourceSet<NodePool> {
    let steps: Vec<Box<dyn Resource<NodePool>>> = vec![
        Box::new(DrainerResource::new(
            deps.cloud.clone(),
            deps.drainer_configs.clone(),
        )),
        Box::new(DrainFinisherResource::new(
            deps.cloud.clone(),
            deps.drainer_configs.clone(),
        )),
    ];

    ResourceSet::new(DRAIN_SET, steps, config.retry.clone(), deps.metrics.clone())
        .with_handles(handled_by_this_version)
}

impl ResourceSets {
    /// Build all compositions; fails when an IPAM config can't produce valid subnets
    pub fn new(deps: &Dependencies, config: &SetsConfig) -> Result<Self, IpamError> {
        Ok(ResourceSets {
            cluster: cluster_set(deps, config)?,
            node_pool: node_pool_set(deps, config)?,
            drain: drain_set(deps, config),
        })
    }
}

#[cfg(test)]
#[path = "sets_test.rs"]
mod tests;
