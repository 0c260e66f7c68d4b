use super::{Condition, NetworkStatus, ScalingSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// TenantCluster is a Custom Resource describing a tenant Kubernetes cluster
///
/// Carries the control plane configuration and the default worker group.
/// Additional workers are declared through `NodePool` objects.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "strato.io",
    version = "v1alpha1",
    kind = "TenantCluster",
    namespaced,
    status = "TenantClusterStatus",
    shortname = "tc",
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.clusterId"}"#,
    printcolumn = r#"{"name":"CIDR", "type":"string", "jsonPath":".status.network.cidr"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.operatorVersion"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantClusterSpec {
    /// Unique cluster id, used to name and tag cloud resources
    pub cluster_id: String,

    /// Cloud provider region
    pub region: String,

    /// Control plane configuration
    pub master: MasterSpec,

    /// Default worker group configuration
    pub workers: WorkerSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MasterSpec {
    /// Instance type of the master node
    pub instance_type: String,

    /// Availability zones the master is placed in
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
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

pub(crate) fn default_docker_volume_size_gb() -> i32 {
    100
}

/// Status of the TenantCluster
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantClusterStatus {
    /// Network range allocated to this cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStatus>,

    /// Subnets assigned per availability zone
    #[serde(default)]
    pub availability_zones: Vec<AvailabilityZoneStatus>,

    /// Operator version the infrastructure was last reconciled with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_version: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Subnets recorded for one availability zone
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZoneStatus {
    pub name: String,
    pub public_cidr: String,
    pub private_cidr: String,
}

impl TenantCluster {
    /// CIDR allocated to this cluster, if any
    pub fn network_cidr(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.network.as_ref())
            .map(|n| n.cidr.as_str())
            .filter(|c| !c.is_empty())
    }

    /// All availability zones requested by the master and the default workers
    pub fn availability_zones(&self) -> Vec<&str> {
        self.spec
            .master
            .availability_zones
            .iter()
            .chain(self.spec.workers.availability_zones.iter())
            .map(String::as_str)
            .collect()
    }

    /// Name of the cloud provider stack holding this cluster's infrastructure
    pub fn stack_name(&self) -> String {
        format!("cluster-{}-control-plane", self.spec.cluster_id)
    }

    /// Name of the autoscaling group of the default workers
    pub fn worker_asg_name(&self) -> String {
        format!("cluster-{}-workers", self.spec.cluster_id)
    }
}
