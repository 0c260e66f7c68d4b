//! Discovers live subnets, route tables and security groups
//!
//! Also derives the live availability zone mapping. Zones with only one of
//! their two subnets are left out.

use super::InfraTarget;
use crate::cloud::CloudProvider;
use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct SubnetsResource {
    cloud: Arc<dyn CloudProvider>,
}

impl SubnetsResource {
    pub fn new(cloud: Arc<dyn CloudProvider>) -> Self {
        SubnetsResource { cloud }
    }
}

#[async_trait]
impl<K: InfraTarget> Resource<K> for SubnetsResource {
    fn name(&self) -> &str {
        "subnets"
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let cluster_id = obj.cluster_id();
        let subnets = self.cloud.describe_subnets(cluster_id).await?;
        let route_tables = self.cloud.describe_route_tables(cluster_id).await?;
        let security_groups = self.cloud.describe_security_groups(cluster_id).await?;

        let ctx = run.context_mut()?;
        ctx.status.subnets = subnets;
        ctx.status.route_tables = route_tables;
        ctx.status.security_groups = security_groups;
        ctx.status.availability_zones = ctx.live_availability_zones();

        debug!(
            cluster = %cluster_id,
            subnets = ctx.status.subnets.len(),
            zones = ctx.status.availability_zones.len(),
            "Discovered network"
        );
        Ok(())
    }

    async fn ensure_deleted(&self, _run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        Ok(())
    }
}
