//! Lets drained workers terminate
//!
//! Once the external drainer marked a `DrainerConfig` as `Drained` (or gave
//! up with `Timeout`), the lifecycle action of its instance is completed and
//! the config removed.

use crate::cloud::CloudProvider;
use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use crate::crd::drainer::DrainerConfig;
use crate::crd::node_pool::NodePool;
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DrainFinisherResource {
    cloud: Arc<dyn CloudProvider>,
    configs: Arc<dyn ObjectStore<DrainerConfig>>,
}

impl DrainFinisherResource {
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        configs: Arc<dyn ObjectStore<DrainerConfig>>,
    ) -> Self {
        DrainFinisherResource { cloud, configs }
    }

    async fn pool_configs(&self, pool: &NodePool) -> Result<Vec<DrainerConfig>, ResourceError> {
        Ok(self
            .configs
            .list()
            .await?
            .into_iter()
            .filter(|c| {
                c.spec.cluster_id == pool.spec.cluster_id
                    && c.spec.node_pool_id == pool.spec.node_pool_id
            })
            .collect())
    }
}

#[async_trait]
impl Resource<NodePool> for DrainFinisherResource {
    fn name(&self) -> &str {
        "drainfinisher"
    }

    async fn ensure_created(
        &self,
        _run: &mut RunContext,
        obj: &NodePool,
    ) -> Result<(), ResourceError> {
        let asg_name = obj.asg_name();

        for config in self.pool_configs(obj).await? {
            let instance = &config.spec.instance_id;
            if config.is_timed_out() {
                warn!(instance = %instance, "Draining timed out, letting the instance terminate");
            } else if !config.is_drained() {
                debug!(instance = %instance, "Instance not drained yet");
                continue;
            }

            match self.cloud.complete_lifecycle_action(&asg_name, instance).await {
                Ok(()) => info!(
                    asg = %asg_name,
                    instance = %instance,
                    "Completed lifecycle action"
                ),
                // The instance is already gone, only the config is left to clean up
                Err(e) if e.is_not_found() => {
                    debug!(instance = %instance, "Lifecycle action not found")
                }
                Err(e) => return Err(e.into()),
            }
            self.configs.delete(&config).await?;
        }
        Ok(())
    }

    async fn ensure_deleted(
        &self,
        _run: &mut RunContext,
        obj: &NodePool,
    ) -> Result<(), ResourceError> {
        for config in self.pool_configs(obj).await? {
            self.configs.delete(&config).await?;
            debug!(instance = %config.spec.instance_id, "Deleted drainer config");
        }
        Ok(())
    }
}
