//! Stack template rendering
//!
//! The pipeline resolves every value a stack needs into `StackParams` and
//! hands them to a `TemplateRenderer`. What the renderer produces (and how
//! nodes are bootstrapped from it) is owned by the renderer.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to render template: {0}")]
    Render(String),
}

/// Subnets of one availability zone as passed to a stack
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneParams {
    pub name: String,
    pub public_cidr: String,
    pub private_cidr: String,
}

/// Worker group settings as passed to a stack
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerParams {
    pub instance_type: String,
    pub docker_volume_size_gb: i32,
    pub min_size: i32,
    pub max_size: i32,
    /// Lower bound passed as the group's minimum desired capacity
    pub min_desired: i32,
}

/// Fully resolved input for a control plane or node pool stack
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StackParams {
    pub cluster_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_pool_id: Option<String>,
    pub account_id: String,
    pub cidr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    pub availability_zones: Vec<ZoneParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_instance_type: Option<String>,
    pub workers: WorkerParams,
    pub operator_version: String,
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, params: &StackParams) -> Result<String, TemplateError>;
}

/// Renders the parameters as a JSON parameter document
///
/// Used when the gateway expands the actual template server side.
#[derive(Default)]
pub struct ParameterDocumentRenderer;

impl TemplateRenderer for ParameterDocumentRenderer {
    fn render(&self, params: &StackParams) -> Result<String, TemplateError> {
        serde_json::to_string_pretty(&serde_json::json!({ "Parameters": params }))
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}
