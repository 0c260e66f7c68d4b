//! In-memory cloud provider for unit tests
#![allow(clippy::unwrap_used)] // Test helper can use unwrap

use super::*;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeState {
    pub account_id: String,
    pub vpc: Option<Vpc>,
    pub subnets: Vec<Subnet>,
    pub route_tables: Vec<RouteTable>,
    pub security_groups: Vec<SecurityGroup>,
    pub stacks: BTreeMap<String, Vec<Stack>>,
    pub asgs: BTreeMap<String, AutoScalingGroup>,
    pub terminating: BTreeMap<String, Vec<LifecycleInstance>>,
    /// Calls that mutate infrastructure, in order
    pub mutations: Vec<String>,
    /// Errors returned by the next calls, consumed front to back
    pub failures: Vec<CloudError>,
}

#[derive(Default)]
pub struct FakeCloud {
    pub state: Mutex<FakeState>,
}

impl FakeCloud {
    pub fn new() -> Self {
        let fake = FakeCloud::default();
        fake.state.lock().unwrap().account_id = "123456789012".to_string();
        fake
    }

    pub fn with_stack(self, name: &str, status: StackStatus, outputs: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().stacks.insert(
            name.to_string(),
            vec![Stack {
                name: name.to_string(),
                status,
                outputs: outputs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }],
        );
        self
    }

    pub fn with_asg(self, name: &str, min: i32, max: i32, desired: i32) -> Self {
        self.state.lock().unwrap().asgs.insert(
            name.to_string(),
            AutoScalingGroup {
                name: name.to_string(),
                min_size: min,
                max_size: max,
                desired_capacity: desired,
            },
        );
        self
    }

    pub fn fail_next(&self, error: CloudError) {
        self.state.lock().unwrap().failures.push(error);
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    fn take_failure(&self) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        if state.failures.is_empty() {
            Ok(())
        } else {
            Err(state.failures.remove(0))
        }
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn account_id(&self) -> Result<String, CloudError> {
        self.take_failure()?;
        Ok(self.state.lock().unwrap().account_id.clone())
    }

    async fn describe_vpc(&self, cluster_id: &str) -> Result<Vpc, CloudError> {
        self.take_failure()?;
        self.state
            .lock()
            .unwrap()
            .vpc
            .clone()
            .ok_or_else(|| CloudError::NotFound(format!("vpc of cluster {}", cluster_id)))
    }

    async fn describe_subnets(&self, _cluster_id: &str) -> Result<Vec<Subnet>, CloudError> {
        self.take_failure()?;
        Ok(self.state.lock().unwrap().subnets.clone())
    }

    async fn describe_route_tables(&self, _cluster_id: &str) -> Result<Vec<RouteTable>, CloudError> {
        self.take_failure()?;
        Ok(self.state.lock().unwrap().route_tables.clone())
    }

    async fn describe_security_groups(
        &self,
        _cluster_id: &str,
    ) -> Result<Vec<SecurityGroup>, CloudError> {
        self.take_failure()?;
        Ok(self.state.lock().unwrap().security_groups.clone())
    }

    async fn describe_stacks(&self, name: &str) -> Result<Vec<Stack>, CloudError> {
        self.take_failure()?;
        self.state
            .lock()
            .unwrap()
            .stacks
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("stack {}", name)))
    }

    async fn create_stack(&self, input: &StackInput) -> Result<(), CloudError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        if state.stacks.contains_key(&input.name) {
            return Err(CloudError::AlreadyExists(format!("stack {}", input.name)));
        }
        state.mutations.push(format!("create_stack:{}", input.name));
        state.stacks.insert(
            input.name.clone(),
            vec![Stack {
                name: input.name.clone(),
                status: StackStatus::CreateInProgress,
                outputs: BTreeMap::new(),
            }],
        );
        Ok(())
    }

    async fn update_stack(&self, input: &StackInput) -> Result<(), CloudError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("update_stack:{}", input.name));
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<(), CloudError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("delete_stack:{}", name));
        Ok(())
    }

    async fn describe_auto_scaling_group(
        &self,
        name: &str,
    ) -> Result<AutoScalingGroup, CloudError> {
        self.take_failure()?;
        self.state
            .lock()
            .unwrap()
            .asgs
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("autoscaling group {}", name)))
    }

    async fn describe_terminating_instances(
        &self,
        asg_name: &str,
    ) -> Result<Vec<LifecycleInstance>, CloudError> {
        self.take_failure()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .terminating
            .get(asg_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn complete_lifecycle_action(
        &self,
        asg_name: &str,
        instance_id: &str,
    ) -> Result<(), CloudError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        state
            .mutations
            .push(format!("complete_lifecycle_action:{}:{}", asg_name, instance_id));
        Ok(())
    }
}
