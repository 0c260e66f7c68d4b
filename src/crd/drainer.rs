use super::{find_condition, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition set by the node drainer once all pods are evicted
pub const CONDITION_DRAINED: &str = "Drained";

/// Condition set by the node drainer when draining gave up
pub const CONDITION_TIMEOUT: &str = "Timeout";

/// DrainerConfig tracks one worker instance waiting on its terminate lifecycle hook
///
/// Created by the drain flow, drained by an external node drainer, and
/// removed again once the lifecycle action has been completed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "strato.io",
    version = "v1alpha1",
    kind = "DrainerConfig",
    namespaced,
    status = "DrainerConfigStatus",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.instanceId"}"#,
    printcolumn = r#"{"name":"Node IP", "type":"string", "jsonPath":".spec.nodeIp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DrainerConfigSpec {
    pub cluster_id: String,
    pub node_pool_id: String,
    pub instance_id: String,
    /// Private IP of the node, used by the drainer to find the Kubernetes node
    pub node_ip: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DrainerConfigStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DrainerConfig {
    pub fn is_drained(&self) -> bool {
        self.has_true_condition(CONDITION_DRAINED)
    }

    pub fn is_timed_out(&self) -> bool {
        self.has_true_condition(CONDITION_TIMEOUT)
    }

    fn has_true_condition(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, type_))
            .map(Condition::is_true)
            .unwrap_or(false)
    }
}

/// Name of the DrainerConfig tracking an instance
pub fn drainer_config_name(instance_id: &str) -> String {
    instance_id.to_lowercase()
}
