use super::cluster::default_docker_volume_size_gb;
use super::{Condition, NetworkStatus, ScalingSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NodePool is a Custom Resource describing a group of workers of a tenant cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "strato.io",
    version = "v1alpha1",
    kind = "NodePool",
    namespaced,
    status = "NodePoolStatus",
    shortname = "np",
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.clusterId"}"#,
    printcolumn = r#"{"name":"Min", "type":"integer", "jsonPath":".spec.scaling.min"}"#,
    printcolumn = r#"{"name":"Max", "type":"integer", "jsonPath":".spec.scaling.max"}"#,
    printcolumn = r#"{"name":"CIDR", "type":"string", "jsonPath":".status.network.cidr"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Id of the tenant cluster this node pool belongs to
    pub cluster_id: String,

    /// Unique node pool id within the cluster
    pub node_pool_id: String,

    /// Instance type of the workers
    pub instance_type: String,

    /// Size of the docker volume in GB
    #[serde(default = "default_docker_volume_size_gb")]
    pub docker_volume_size_gb: i32,

    /// Autoscaling bounds
    pub scaling: ScalingSpec,

    /// Availability zones the workers are spread across
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

/// Status of the NodePool
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatus {
    /// Network range allocated to this node pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStatus>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl NodePool {
    /// CIDR allocated to this node pool, if any
    pub fn network_cidr(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.network.as_ref())
            .map(|n| n.cidr.as_str())
            .filter(|c| !c.is_empty())
    }

    pub fn stack_name(&self) -> String {
        format!(
            "cluster-{}-pool-{}",
            self.spec.cluster_id, self.spec.node_pool_id
        )
    }

    pub fn asg_name(&self) -> String {
        format!(
            "cluster-{}-pool-{}-workers",
            self.spec.cluster_id, self.spec.node_pool_id
        )
    }
}
