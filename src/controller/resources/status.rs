//! Writes the reconciled state back onto the cluster status

use crate::controller::change::DeclaredWorkers;
use crate::controller::context::{AvailabilityZone, RunContext};
use crate::controller::resource::{Resource, ResourceError};
use crate::crd::cluster::{AvailabilityZoneStatus, TenantCluster, TenantClusterStatus};
use crate::crd::{set_condition, Condition};
use crate::store::ObjectStore;
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

pub const CONDITION_CREATED: &str = "Created";
pub const CONDITION_UPDATING: &str = "Updating";

pub struct StatusResource {
    clusters: Arc<dyn ObjectStore<TenantCluster>>,
}

impl StatusResource {
    pub fn new(clusters: Arc<dyn ObjectStore<TenantCluster>>) -> Self {
        StatusResource { clusters }
    }
}

fn zone_status(zones: &[AvailabilityZone]) -> Vec<AvailabilityZoneStatus> {
    zones
        .iter()
        .map(|z| AvailabilityZoneStatus {
            name: z.name.clone(),
            public_cidr: z.public.cidr.map(|c| c.to_string()).unwrap_or_default(),
            private_cidr: z.private.cidr.map(|c| c.to_string()).unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl Resource<TenantCluster> for StatusResource {
    fn name(&self) -> &str {
        "status"
    }

    async fn ensure_created(
        &self,
        run: &mut RunContext,
        obj: &TenantCluster,
    ) -> Result<(), ResourceError> {
        let ctx = run.context()?;
        let Some(stack_status) = ctx.status.stack_status else {
            debug!(cluster = %obj.spec.cluster_id, "No stack yet, status left alone");
            return Ok(());
        };

        let current = obj.status.clone().unwrap_or_default();
        let updating = stack_status.is_transitioning();

        let mut conditions = current.conditions.clone();
        set_condition(
            &mut conditions,
            Condition::new(CONDITION_CREATED, true, "StackCreated", "Stack exists"),
        );
        set_condition(
            &mut conditions,
            Condition::new(
                CONDITION_UPDATING,
                updating,
                if updating { "StackUpdating" } else { "StackStable" },
                format!("Stack is {:?}", stack_status),
            ),
        );

        // The recorded version moves once the stack settled on it
        let operator_version = if updating || ctx.status.operator_version.is_empty() {
            current.operator_version.clone()
        } else {
            Some(ctx.status.operator_version.clone())
        };

        let desired = TenantClusterStatus {
            network: current.network.clone(),
            availability_zones: zone_status(&ctx.spec.availability_zones),
            operator_version,
            conditions,
        };
        if desired == current {
            debug!(cluster = %obj.spec.cluster_id, "Status is up to date");
            return Ok(());
        }

        let patch = serde_json::json!({
            "availabilityZones": desired.availability_zones,
            "operatorVersion": desired.operator_version,
            "conditions": desired.conditions,
        });
        self.clusters.patch_status(obj, patch).await?;

        info!(
            cluster = %obj.spec.cluster_id,
            object = %obj.name_any(),
            updating,
            declared_version = %obj.operator_version(),
            "Updated cluster status"
        );
        Ok(())
    }

    async fn ensure_deleted(
        &self,
        _run: &mut RunContext,
        _obj: &TenantCluster,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
}
