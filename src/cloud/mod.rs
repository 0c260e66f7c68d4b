//! Cloud provider interface
//!
//! Narrow view of the cloud provider API consumed by the pipeline steps.
//! Every call may fail with a generic provider error, or with `NotFound` /
//! `AlreadyExists` which callers branch on explicitly.

pub mod http;
pub mod template;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CloudError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("cloud provider error: {0}")]
    Provider(String),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CloudError::AlreadyExists(_))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    Public,
    Private,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub id: String,
    pub cidr: Ipv4Net,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: String,
    pub cidr: Ipv4Net,
    pub availability_zone: String,
    pub kind: SubnetKind,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    pub id: String,
    pub availability_zone: String,
    pub kind: SubnetKind,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// Stack lifecycle states as reported by the provider
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateRollbackInProgress,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    UpdateRollbackFailed,
    RollbackInProgress,
    RollbackComplete,
    RollbackFailed,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
}

impl StackStatus {
    /// The stack is moving between states and must not be touched
    pub fn is_transitioning(self) -> bool {
        matches!(
            self,
            StackStatus::CreateInProgress
                | StackStatus::UpdateInProgress
                | StackStatus::UpdateCompleteCleanupInProgress
                | StackStatus::UpdateRollbackInProgress
                | StackStatus::UpdateRollbackCompleteCleanupInProgress
                | StackStatus::RollbackInProgress
                | StackStatus::DeleteInProgress
        )
    }

    /// The stack ended in a state that needs human attention
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            StackStatus::CreateFailed
                | StackStatus::RollbackComplete
                | StackStatus::RollbackFailed
                | StackStatus::UpdateRollbackFailed
                | StackStatus::DeleteFailed
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub name: String,
    pub status: StackStatus,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackInput {
    pub name: String,
    pub template_body: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalingGroup {
    pub name: String,
    pub min_size: i32,
    pub max_size: i32,
    pub desired_capacity: i32,
}

/// Instance held in the terminate lifecycle hook of an autoscaling group
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleInstance {
    pub instance_id: String,
    pub private_ip: String,
}

/// Cloud provider operations used by the pipeline
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn account_id(&self) -> Result<String, CloudError>;

    async fn describe_vpc(&self, cluster_id: &str) -> Result<Vpc, CloudError>;

    async fn describe_subnets(&self, cluster_id: &str) -> Result<Vec<Subnet>, CloudError>;

    async fn describe_route_tables(&self, cluster_id: &str) -> Result<Vec<RouteTable>, CloudError>;

    async fn describe_security_groups(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<SecurityGroup>, CloudError>;

    /// Stacks matching the name; `NotFound` when there are none
    async fn describe_stacks(&self, name: &str) -> Result<Vec<Stack>, CloudError>;

    async fn create_stack(&self, input: &StackInput) -> Result<(), CloudError>;

    async fn update_stack(&self, input: &StackInput) -> Result<(), CloudError>;

    async fn delete_stack(&self, name: &str) -> Result<(), CloudError>;

    async fn describe_auto_scaling_group(&self, name: &str)
        -> Result<AutoScalingGroup, CloudError>;

    async fn describe_terminating_instances(
        &self,
        asg_name: &str,
    ) -> Result<Vec<LifecycleInstance>, CloudError>;

    async fn complete_lifecycle_action(
        &self,
        asg_name: &str,
        instance_id: &str,
    ) -> Result<(), CloudError>;
}

/// Tags applied to every stack of a cluster
pub fn stack_tags(cluster_id: &str, operator_version: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("strato.io/cluster".to_string(), cluster_id.to_string()),
        (
            "strato.io/operator-version".to_string(),
            operator_version.to_string(),
        ),
    ])
}

#[cfg(test)]
pub(crate) mod fake;
