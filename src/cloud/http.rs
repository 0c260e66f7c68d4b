//! Cloud gateway client
//!
//! Talks JSON over HTTP to a gateway that fronts the cloud provider API.
//! The gateway owns credentials and request signing; this client only maps
//! calls to routes and HTTP status codes to `CloudError`.

use super::{
    AutoScalingGroup, CloudError, CloudProvider, LifecycleInstance, RouteTable, SecurityGroup,
    Stack, StackInput, Subnet, Vpc,
};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default timeout for a single gateway request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    account_id: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CloudError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CloudError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(GatewayClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, CloudError> {
        debug!(path = %path, "Gateway GET");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| CloudError::Provider(format!("GET {} failed: {}", path, e)))?;

        let response = check_status(response, what).await?;
        response
            .json()
            .await
            .map_err(|e| CloudError::Provider(format!("invalid response for {}: {}", what, e)))
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<(), CloudError> {
        let response = request
            .send()
            .await
            .map_err(|e| CloudError::Provider(format!("request for {} failed: {}", what, e)))?;
        check_status(response, what).await?;
        Ok(())
    }
}

/// Map a gateway status code onto the error taxonomy
///
/// Returns None for success codes.
pub fn classify_status(status: StatusCode, what: &str, body: &str) -> Option<CloudError> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::NOT_FOUND => CloudError::NotFound(what.to_string()),
        StatusCode::CONFLICT => CloudError::AlreadyExists(what.to_string()),
        _ => CloudError::Provider(format!("{} returned {}: {}", what, status, body)),
    })
}

async fn check_status(response: Response, what: &str) -> Result<Response, CloudError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match classify_status(status, what, &body) {
        Some(err) => Err(err),
        None => Err(CloudError::Provider(format!("{} returned {}", what, status))),
    }
}

#[async_trait]
impl CloudProvider for GatewayClient {
    async fn account_id(&self) -> Result<String, CloudError> {
        let account: AccountResponse = self.get_json("/account", "account").await?;
        Ok(account.account_id)
    }

    async fn describe_vpc(&self, cluster_id: &str) -> Result<Vpc, CloudError> {
        self.get_json(
            &format!("/clusters/{}/vpc", cluster_id),
            &format!("vpc of cluster {}", cluster_id),
        )
        .await
    }

    async fn describe_subnets(&self, cluster_id: &str) -> Result<Vec<Subnet>, CloudError> {
        self.get_json(
            &format!("/clusters/{}/subnets", cluster_id),
            &format!("subnets of cluster {}", cluster_id),
        )
        .await
    }

    async fn describe_route_tables(&self, cluster_id: &str) -> Result<Vec<RouteTable>, CloudError> {
        self.get_json(
            &format!("/clusters/{}/route-tables", cluster_id),
            &format!("route tables of cluster {}", cluster_id),
        )
        .await
    }

    async fn describe_security_groups(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<SecurityGroup>, CloudError> {
        self.get_json(
            &format!("/clusters/{}/security-groups", cluster_id),
            &format!("security groups of cluster {}", cluster_id),
        )
        .await
    }

    async fn describe_stacks(&self, name: &str) -> Result<Vec<Stack>, CloudError> {
        self.get_json(&format!("/stacks/{}", name), &format!("stack {}", name))
            .await
    }

    async fn create_stack(&self, input: &StackInput) -> Result<(), CloudError> {
        self.send(
            self.client.post(self.url("/stacks")).json(input),
            &format!("stack {}", input.name),
        )
        .await
    }

    async fn update_stack(&self, input: &StackInput) -> Result<(), CloudError> {
        self.send(
            self.client
                .put(self.url(&format!("/stacks/{}", input.name)))
                .json(input),
            &format!("stack {}", input.name),
        )
        .await
    }

    async fn delete_stack(&self, name: &str) -> Result<(), CloudError> {
        self.send(
            self.client.delete(self.url(&format!("/stacks/{}", name))),
            &format!("stack {}", name),
        )
        .await
    }

    async fn describe_auto_scaling_group(
        &self,
        name: &str,
    ) -> Result<AutoScalingGroup, CloudError> {
        self.get_json(
            &format!("/autoscaling-groups/{}", name),
            &format!("autoscaling group {}", name),
        )
        .await
    }

    async fn describe_terminating_instances(
        &self,
        asg_name: &str,
    ) -> Result<Vec<LifecycleInstance>, CloudError> {
        self.get_json(
            &format!("/autoscaling-groups/{}/terminating-instances", asg_name),
            &format!("terminating instances of {}", asg_name),
        )
        .await
    }

    async fn complete_lifecycle_action(
        &self,
        asg_name: &str,
        instance_id: &str,
    ) -> Result<(), CloudError> {
        self.send(
            self.client.post(self.url(&format!(
                "/autoscaling-groups/{}/lifecycle-actions/{}",
                asg_name, instance_id
            ))),
            &format!("lifecycle action of {}", instance_id),
        )
        .await
    }
}
