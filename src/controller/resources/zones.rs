//! Computes the desired availability zone layout of a cluster or node pool
//!
//! A cluster requires the union of its master, worker and node pool zones,
//! laid out over the cluster range. A node pool requires its own zones, laid
//! out over the pool range. Zones already provisioned keep their subnets,
//! new zones get a free quarter of the range.
//!
//! Subnets are discovered per cluster, so the live zones are narrowed to the
//! ones inside the range before they are compared or reused.

use super::InfraTarget;
use crate::controller::context::{AvailabilityZone, RunContext, ZoneSubnet};
use crate::controller::resource::{Resource, ResourceError};
use crate::crd::cluster::TenantCluster;
use crate::crd::node_pool::NodePool;
use crate::ipam::split::{split_availability_zones, ZoneAssignment};
use crate::store::ObjectStore;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// True when both subnets of a live zone lie inside `range`
fn within(range: &Ipv4Net, zone: &AvailabilityZone) -> bool {
    match (zone.public.cidr, zone.private.cidr) {
        (Some(public), Some(private)) => range.contains(&public) && range.contains(&private),
        _ => false,
    }
}

/// Desired zones over `parent`, reusing the live zones inside it
///
/// `live` is narrowed to the zones inside `parent`.
fn lay_out_zones(
    parent: Ipv4Net,
    required: &BTreeSet<String>,
    live: &mut Vec<AvailabilityZone>,
) -> Result<Vec<AvailabilityZone>, ResourceError> {
    live.retain(|zone| within(&parent, zone));

    let live_zones: BTreeMap<&str, &AvailabilityZone> =
        live.iter().map(|z| (z.name.as_str(), z)).collect();
    let assignments: BTreeMap<String, ZoneAssignment> = live_zones
        .iter()
        .filter_map(|(name, zone)| match (zone.public.cidr, zone.private.cidr) {
            (Some(public), Some(private)) => {
                Some((name.to_string(), ZoneAssignment { public, private }))
            }
            _ => None,
        })
        .collect();

    let assigned = split_availability_zones(parent, required, &assignments)?;

    Ok(assigned
        .into_iter()
        .map(|(name, pair)| {
            let existing = live_zones.get(name.as_str());
            AvailabilityZone {
                public: ZoneSubnet {
                    cidr: Some(pair.public),
                    id: existing.map(|z| z.public.id.clone()).unwrap_or_default(),
                },
                private: ZoneSubnet {
                    cidr: Some(pair.private),
                    id: existing.map(|z| z.private.id.clone()).unwrap_or_default(),
                },
                route_table_ids: existing
                    .map(|z| z.route_table_ids.clone())
                    .unwrap_or_default(),
                name,
            }
        })
        .collect())
}

pub struct ZonesResource {
    node_pools: Arc<dyn ObjectStore<NodePool>>,
}

impl ZonesResource {
    pub fn new(node_pools: Arc<dyn ObjectStore<NodePool>>) -> Self {
        ZonesResource { node_pools }
    }

    async fn required_zones(
        &self,
        cluster: &TenantCluster,
    ) -> Result<BTreeSet<String>, ResourceError> {
        let mut required: BTreeSet<String> =
            cluster.availability_zone_names().into_iter().collect();

        for pool in self.node_pools.list().await? {
            if pool.spec.cluster_id == cluster.spec.cluster_id {
                required.extend(pool.spec.availability_zones.iter().cloned());
            }
        }
        Ok(required)
    }
}

#[async_trait]
impl Resource<TenantCluster> for ZonesResource {
    fn name(&self) -> &str {
        "zones"
    }

    async fn ensure_created(
        &self,
        run: &mut RunContext,
        cluster: &TenantCluster,
    ) -> Result<(), ResourceError> {
        let Some(parent) = run.context()?.status.network_cidr else {
            info!(
                cluster = %cluster.spec.cluster_id,
                "No network range allocated yet, canceling reconciliation"
            );
            run.cancel_reconciliation();
            return Ok(());
        };

        let required = self.required_zones(cluster).await?;

        let ctx = run.context_mut()?;
        let desired = lay_out_zones(parent, &required, &mut ctx.status.availability_zones)?;

        debug!(
            cluster = %cluster.spec.cluster_id,
            zones = ?desired.iter().map(|z| z.name.as_str()).collect::<Vec<_>>(),
            "Computed availability zones"
        );
        ctx.spec.availability_zones = desired;
        Ok(())
    }

    async fn ensure_deleted(
        &self,
        _run: &mut RunContext,
        _cluster: &TenantCluster,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Zones of one node pool, laid out over the pool's own range
pub struct NodePoolZonesResource;

#[async_trait]
impl Resource<NodePool> for NodePoolZonesResource {
    fn name(&self) -> &str {
        "zones"
    }

    async fn ensure_created(
        &self,
        run: &mut RunContext,
        pool: &NodePool,
    ) -> Result<(), ResourceError> {
        let Some(parent) = run.context()?.status.network_cidr else {
            info!(
                node_pool = %pool.spec.node_pool_id,
                "No network range allocated yet, canceling reconciliation"
            );
            run.cancel_reconciliation();
            return Ok(());
        };

        let required: BTreeSet<String> = pool.availability_zone_names().into_iter().collect();

        let ctx = run.context_mut()?;
        let desired = lay_out_zones(parent, &required, &mut ctx.status.availability_zones)?;

        debug!(
            node_pool = %pool.spec.node_pool_id,
            zones = ?desired.iter().map(|z| z.name.as_str()).collect::<Vec<_>>(),
            "Computed availability zones"
        );
        ctx.spec.availability_zones = desired;
        Ok(())
    }

    async fn ensure_deleted(
        &self,
        _run: &mut RunContext,
        _pool: &NodePool,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "zones_test.rs"]
mod tests;
