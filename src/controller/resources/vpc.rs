//! Discovers the tenant VPC
//!
//! The VPC is part of the cluster stack, so it does not exist before the
//! first stack creation. A missing VPC leaves the id empty.

use super::InfraTarget;
use crate::cloud::CloudProvider;
use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct VpcResource {
    cloud: Arc<dyn CloudProvider>,
}

impl VpcResource {
    pub fn new(cloud: Arc<dyn CloudProvider>) -> Self {
        VpcResource { cloud }
    }
}

#[async_trait]
impl<K: InfraTarget> Resource<K> for VpcResource {
    fn name(&self) -> &str {
        "vpc"
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let vpc = match self.cloud.describe_vpc(obj.cluster_id()).await {
            Ok(vpc) => vpc,
            Err(e) if e.is_not_found() => {
                debug!(cluster = %obj.cluster_id(), "VPC not found");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        debug!(cluster = %obj.cluster_id(), vpc_id = %vpc.id, "Found VPC");
        run.context_mut()?.status.vpc_id = vpc.id;
        Ok(())
    }

    async fn ensure_deleted(&self, _run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        Ok(())
    }
}
