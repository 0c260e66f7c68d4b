//! Tracks workers held in the terminate lifecycle hook
//!
//! For every instance of the node pool's autoscaling group waiting on the
//! hook a `DrainerConfig` is created, which the external node drainer picks
//! up. The lifecycle action is completed by the `drainfinisher` step.

use crate::cloud::CloudProvider;
use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use crate::crd::drainer::{drainer_config_name, DrainerConfig, DrainerConfigSpec};
use crate::crd::node_pool::NodePool;
use crate::crd::{CLUSTER_ID_LABEL, NODE_POOL_ID_LABEL};
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DrainerResource {
    cloud: Arc<dyn CloudProvider>,
    configs: Arc<dyn ObjectStore<DrainerConfig>>,
}

impl DrainerResource {
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        configs: Arc<dyn ObjectStore<DrainerConfig>>,
    ) -> Self {
        DrainerResource { cloud, configs }
    }
}

/// DrainerConfig for one instance, placed next to its node pool
pub fn drainer_config(
    pool: &NodePool,
    namespace: &str,
    instance_id: &str,
    node_ip: &str,
) -> DrainerConfig {
    let mut config = DrainerConfig::new(
        &drainer_config_name(instance_id),
        DrainerConfigSpec {
            cluster_id: pool.spec.cluster_id.clone(),
            node_pool_id: pool.spec.node_pool_id.clone(),
            instance_id: instance_id.to_string(),
            node_ip: node_ip.to_string(),
        },
    );
    config.metadata.namespace = Some(namespace.to_string());
    config.metadata.labels = Some(BTreeMap::from([
        (CLUSTER_ID_LABEL.to_string(), pool.spec.cluster_id.clone()),
        (NODE_POOL_ID_LABEL.to_string(), pool.spec.node_pool_id.clone()),
    ]));
    config
}

#[async_trait]
impl Resource<NodePool> for DrainerResource {
    fn name(&self) -> &str {
        "drainer"
    }

    async fn ensure_created(
        &self,
        _run: &mut RunContext,
        obj: &NodePool,
    ) -> Result<(), ResourceError> {
        let namespace = obj.namespace().ok_or_else(|| {
            ResourceError::InvalidConfig(format!("node pool {} has no namespace", obj.name_any()))
        })?;
        let asg_name = obj.asg_name();

        let instances = match self.cloud.describe_terminating_instances(&asg_name).await {
            Ok(instances) => instances,
            Err(e) if e.is_not_found() => {
                debug!(asg = %asg_name, "Autoscaling group not found");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for instance in instances {
            let config =
                drainer_config(obj, &namespace, &instance.instance_id, &instance.private_ip);
            match self.configs.create(&config).await {
                Ok(()) => info!(
                    asg = %asg_name,
                    instance = %instance.instance_id,
                    "Created drainer config"
                ),
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(instance = %instance.instance_id, "Drainer config already exists")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn ensure_deleted(
        &self,
        _run: &mut RunContext,
        _obj: &NodePool,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
}
