//! Reads the bounds of the worker autoscaling group

use super::InfraTarget;
use crate::cloud::CloudProvider;
use crate::controller::context::{RunContext, ScalingStatus};
use crate::controller::resource::{Resource, ResourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct AsgResource {
    cloud: Arc<dyn CloudProvider>,
}

impl AsgResource {
    pub fn new(cloud: Arc<dyn CloudProvider>) -> Self {
        AsgResource { cloud }
    }
}

#[async_trait]
impl<K: InfraTarget> Resource<K> for AsgResource {
    fn name(&self) -> &str {
        "asg"
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let name = obj.asg_name();
        let group = match self.cloud.describe_auto_scaling_group(&name).await {
            Ok(group) => group,
            Err(e) if e.is_not_found() => {
                debug!(asg = %name, "Autoscaling group not found");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            asg = %name,
            min = group.min_size,
            max = group.max_size,
            desired = group.desired_capacity,
            "Found autoscaling group"
        );
        run.context_mut()?.status.scaling = ScalingStatus {
            min: group.min_size,
            max: group.max_size,
            desired: group.desired_capacity,
        };
        Ok(())
    }

    async fn ensure_deleted(&self, _run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::FakeCloud;
    use crate::controller::resources::fixtures;

    #[tokio::test]
    async fn test_records_bounds() {
        let cloud = FakeCloud::new().with_asg("cluster-a1b2c-pool-np1-workers", 1, 5, 4);
        let step = AsgResource::new(Arc::new(cloud));
        let mut run = fixtures::run();

        step.ensure_created(&mut run, &fixtures::node_pool("a1b2c", "np1"))
            .await
            .unwrap();

        assert_eq!(
            run.context().unwrap().status.scaling,
            ScalingStatus {
                min: 1,
                max: 5,
                desired: 4
            }
        );
    }

    #[tokio::test]
    async fn test_missing_group_leaves_bounds_empty() {
        let step = AsgResource::new(Arc::new(FakeCloud::new()));
        let mut run = fixtures::run();

        step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
            .await
            .unwrap();

        assert!(run.context().unwrap().status.scaling.is_empty());
    }
}
