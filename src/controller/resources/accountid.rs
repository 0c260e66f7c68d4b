//! Discovers the cloud account id the operator runs in

use super::InfraTarget;
use crate::cloud::CloudProvider;
use crate::controller::context::RunContext;
use crate::controller::resource::{Resource, ResourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct AccountIdResource {
    cloud: Arc<dyn CloudProvider>,
}

impl AccountIdResource {
    pub fn new(cloud: Arc<dyn CloudProvider>) -> Self {
        AccountIdResource { cloud }
    }
}

#[async_trait]
impl<K: InfraTarget> Resource<K> for AccountIdResource {
    fn name(&self) -> &str {
        "accountid"
    }

    async fn ensure_created(&self, run: &mut RunContext, _obj: &K) -> Result<(), ResourceError> {
        let account_id = self.cloud.account_id().await?;
        debug!(account_id = %account_id, "Found account id");

        run.context_mut()?.status.account_id = account_id;
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
    use crate::cloud::CloudError;
    use crate::controller::resources::fixtures;

    #[tokio::test]
    async fn test_records_account_id() {
        let step = AccountIdResource::new(Arc::new(FakeCloud::new()));
        let mut run = fixtures::run();

        step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
            .await
            .unwrap();

        assert_eq!(run.context().unwrap().status.account_id, "123456789012");
    }

    #[tokio::test]
    async fn test_provider_error_is_returned() {
        let cloud = FakeCloud::new();
        cloud.fail_next(CloudError::Provider("throttled".to_string()));
        let step = AccountIdResource::new(Arc::new(cloud));
        let mut run = fixtures::run();

        let result = step
            .ensure_created(&mut run, &fixtures::cluster("a1b2c"))
            .await;

        assert!(matches!(result, Err(ResourceError::Cloud(CloudError::Provider(_)))));
    }

    #[tokio::test]
    async fn test_missing_context_fails() {
        let step = AccountIdResource::new(Arc::new(FakeCloud::new()));
        let mut run = RunContext::new();

        let result = step
            .ensure_created(&mut run, &fixtures::cluster("a1b2c"))
            .await;

        assert!(matches!(result, Err(ResourceError::Context(_))));
    }
}
