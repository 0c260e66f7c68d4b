//! Creates, updates and deletes the infrastructure stack
//!
//! The only step mutating cloud infrastructure. Creating or deleting a stack
//! takes minutes, so the step cancels the run afterwards and lets the next
//! trigger pick up the new state. Updates are gated by change detection.

use super::stackoutput::{describe_live_stacks, single_stack};
use super::InfraTarget;
use crate::cloud::template::{StackParams, TemplateRenderer, WorkerParams, ZoneParams};
use crate::cloud::{stack_tags, CloudProvider, StackInput, StackStatus};
use crate::controller::change::{min_desired_workers, should_scale, should_update};
use crate::controller::context::{AvailabilityZone, ReconcileContext, RunContext};
use crate::controller::resource::{Resource, ResourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct StackResource {
    cloud: Arc<dyn CloudProvider>,
    renderer: Arc<dyn TemplateRenderer>,
}

fn zone_params(zones: &[AvailabilityZone]) -> Vec<ZoneParams> {
    zones
        .iter()
        .map(|z| ZoneParams {
            name: z.name.clone(),
            public_cidr: z.public.cidr.map(|c| c.to_string()).unwrap_or_default(),
            private_cidr: z.private.cidr.map(|c| c.to_string()).unwrap_or_default(),
        })
        .collect()
}

impl StackResource {
    pub fn new(cloud: Arc<dyn CloudProvider>, renderer: Arc<dyn TemplateRenderer>) -> Self {
        StackResource { cloud, renderer }
    }

    /// Resolve the stack input; None while prerequisites are missing
    fn stack_input<K: InfraTarget>(
        &self,
        ctx: &ReconcileContext,
        obj: &K,
    ) -> Result<Option<StackInput>, ResourceError> {
        let Some(cidr) = ctx.status.network_cidr else {
            info!(stack = %obj.stack_name(), "No network range allocated yet");
            return Ok(None);
        };

        if ctx.spec.availability_zones.is_empty() {
            info!(stack = %obj.stack_name(), "Availability zones not computed yet");
            return Ok(None);
        }
        let availability_zones = zone_params(&ctx.spec.availability_zones);

        let scaling = obj.scaling();
        let params = StackParams {
            cluster_id: obj.cluster_id().to_string(),
            node_pool_id: obj.node_pool_id().map(str::to_string),
            account_id: ctx.status.account_id.clone(),
            cidr: cidr.to_string(),
            vpc_id: Some(ctx.status.vpc_id.clone()).filter(|id| !id.is_empty()),
            availability_zones,
            master_instance_type: obj.master_instance_type().map(str::to_string),
            workers: WorkerParams {
                instance_type: obj.worker_instance_type().to_string(),
                docker_volume_size_gb: obj.worker_docker_volume_size_gb(),
                min_size: scaling.min,
                max_size: scaling.max,
                min_desired: min_desired_workers(
                    scaling.min,
                    scaling.max,
                    ctx.status.scaling.desired,
                ),
            },
            operator_version: obj.operator_version().to_string(),
        };

        Ok(Some(StackInput {
            name: obj.stack_name(),
            template_body: self.renderer.render(&params)?,
            tags: stack_tags(obj.cluster_id(), obj.operator_version()),
        }))
    }

    async fn create<K: InfraTarget>(
        &self,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<(), ResourceError> {
        let Some(input) = self.stack_input(run.context()?, obj)? else {
            run.cancel_reconciliation();
            return Ok(());
        };

        match self.cloud.create_stack(&input).await {
            Ok(()) => info!(stack = %input.name, "Creating stack"),
            Err(e) if e.is_already_exists() => {
                debug!(stack = %input.name, "Stack already being created")
            }
            Err(e) => return Err(e.into()),
        }

        run.context_mut()?.status.stack_status = Some(StackStatus::CreateInProgress);
        // Creation takes a while, nothing downstream can make progress before it's done
        run.cancel_reconciliation();
        Ok(())
    }

    async fn update<K: InfraTarget>(
        &self,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<(), ResourceError> {
        let Some(input) = self.stack_input(run.context()?, obj)? else {
            run.cancel_reconciliation();
            return Ok(());
        };

        self.cloud.update_stack(&input).await?;
        info!(stack = %input.name, "Updating stack");

        run.context_mut()?.status.stack_status = Some(StackStatus::UpdateInProgress);
        Ok(())
    }
}

#[async_trait]
impl<K: InfraTarget> Resource<K> for StackResource {
    fn name(&self) -> &str {
        "stack"
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let name = obj.stack_name();
        let Some(stacks) = describe_live_stacks(self.cloud.as_ref(), &name).await? else {
            return self.create(run, obj).await;
        };
        let stack = single_stack(&name, stacks)?;

        if stack.status.is_transitioning() {
            info!(
                stack = %name,
                status = ?stack.status,
                "Stack is transitioning, canceling reconciliation"
            );
            run.cancel_reconciliation();
            return Ok(());
        }
        if stack.status.is_failed() {
            return Err(ResourceError::ExecutionFailed(format!(
                "stack {} is in failed state {:?}",
                name, stack.status
            )));
        }

        if should_update(run, obj)? {
            return self.update(run, obj).await;
        }
        if should_scale(run, obj)? {
            return self.update(run, obj).await;
        }

        debug!(stack = %name, "Stack is up to date");
        Ok(())
    }

    async fn ensure_deleted(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let name = obj.stack_name();
        let Some(stacks) = describe_live_stacks(self.cloud.as_ref(), &name).await? else {
            debug!(stack = %name, "Stack already gone");
            return Ok(());
        };

        if stacks.iter().any(|s| s.status == StackStatus::DeleteInProgress) {
            info!(stack = %name, "Stack deletion in progress, canceling reconciliation");
            run.cancel_reconciliation();
            return Ok(());
        }

        match self.cloud.delete_stack(&name).await {
            Ok(()) => info!(stack = %name, "Deleting stack"),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        run.cancel_reconciliation();
        Ok(())
    }
}

#[cfg(test)]
#[path = "stack_test.rs"]
mod tests;
