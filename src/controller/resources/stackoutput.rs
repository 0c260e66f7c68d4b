//! Reads what the stack was last deployed with from its outputs

use super::InfraTarget;
use crate::cloud::{CloudProvider, Stack, StackStatus};
use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const OUTPUT_MASTER_INSTANCE_TYPE: &str = "MasterInstanceType";
pub const OUTPUT_WORKER_INSTANCE_TYPE: &str = "WorkerInstanceType";
pub const OUTPUT_DOCKER_VOLUME_SIZE_GB: &str = "DockerVolumeSizeGB";
pub const OUTPUT_OPERATOR_VERSION: &str = "OperatorVersion";

/// Describe the stack of `name`, ignoring stacks already deleted
///
/// Returns None when no stack exists.
pub(crate) async fn describe_live_stacks(
    cloud: &dyn CloudProvider,
    name: &str,
) -> Result<Option<Vec<Stack>>, ResourceError> {
    match cloud.describe_stacks(name).await {
        Ok(stacks) => {
            let live: Vec<Stack> = stacks
                .into_iter()
                .filter(|s| s.status != StackStatus::DeleteComplete)
                .collect();
            Ok(if live.is_empty() { None } else { Some(live) })
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Exactly one stack per name, anything else is a broken invariant
pub(crate) fn single_stack(name: &str, mut stacks: Vec<Stack>) -> Result<Stack, ResourceError> {
    if stacks.len() != 1 {
        return Err(ResourceError::ExecutionFailed(format!(
            "expected exactly one stack {}, got {}",
            name,
            stacks.len()
        )));
    }
    Ok(stacks.remove(0))
}

pub struct StackOutputResource {
    cloud: Arc<dyn CloudProvider>,
}

impl StackOutputResource {
    pub fn new(cloud: Arc<dyn CloudProvider>) -> Self {
        StackOutputResource { cloud }
    }
}

#[async_trait]
impl<K: InfraTarget> Resource<K> for StackOutputResource {
    fn name(&self) -> &str {
        "stackoutput"
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let name = obj.stack_name();
        let Some(stacks) = describe_live_stacks(self.cloud.as_ref(), &name).await? else {
            debug!(stack = %name, "Stack not found");
            return Ok(());
        };
        let stack = single_stack(&name, stacks)?;

        let docker_volume_size_gb = match stack.outputs.get(OUTPUT_DOCKER_VOLUME_SIZE_GB) {
            Some(value) => value.parse::<i32>().map_err(|_| {
                ResourceError::ExecutionFailed(format!(
                    "stack {} output {} is not a number: {:?}",
                    name, OUTPUT_DOCKER_VOLUME_SIZE_GB, value
                ))
            })?,
            None => 0,
        };
        let output = |key: &str| stack.outputs.get(key).cloned().unwrap_or_default();

        let ctx = run.context_mut()?;
        ctx.status.stack_status = Some(stack.status);
        ctx.status.master_instance_type = output(OUTPUT_MASTER_INSTANCE_TYPE);
        ctx.status.worker_instance_type = output(OUTPUT_WORKER_INSTANCE_TYPE);
        ctx.status.worker_docker_volume_size_gb = docker_volume_size_gb;
        ctx.status.operator_version = output(OUTPUT_OPERATOR_VERSION);

        debug!(stack = %name, status = ?stack.status, "Read stack outputs");
        Ok(())
    }

    async fn ensure_deleted(&self, _run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        Ok(())
    }
}
