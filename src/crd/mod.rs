//! Custom resources reconciled by strato
//!
//! - `TenantCluster` - a tenant Kubernetes cluster with its control plane and default workers
//! - `NodePool` - an additional group of workers attached to a tenant cluster
//! - `DrainerConfig` - one worker instance waiting for its node to be drained

pub mod cluster;
pub mod drainer;
pub mod node_pool;

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the operator version an object is reconciled by
pub const OPERATOR_VERSION_LABEL: &str = "strato.io/operator-version";

/// Label carrying the tenant cluster id on dependent objects
pub const CLUSTER_ID_LABEL: &str = "strato.io/cluster";

/// Label carrying the node pool id on dependent objects
pub const NODE_POOL_ID_LABEL: &str = "strato.io/node-pool";

/// Version of this operator build
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Autoscaling bounds for a group of workers
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ScalingSpec {
    /// Minimum number of workers
    pub min: i32,

    /// Maximum number of workers
    pub max: i32,
}

/// Network range allocated to a cluster or node pool
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct NetworkStatus {
    /// Allocated CIDR, e.g. "10.100.8.0/24"
    pub cidr: String,
}

/// Status condition, modelled after Kubernetes conditions
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (Created, Updating, Drained, Timeout, ...)
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// RFC3339 timestamp of the last status change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Build a condition stamped with the current time
    pub fn new(type_: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Condition {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or replace a condition of the same type
///
/// The transition time of an existing condition is kept when its status does
/// not change, so repeated reconciliations don't rewrite the timestamp.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Read the operator version label of any object
pub fn operator_version_label(meta: &kube::api::ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()
        .and_then(|l| l.get(OPERATOR_VERSION_LABEL))
        .map(String::as_str)
}

#[cfg(test)]
#[path = "crd_test.rs"]
mod tests;
