use super::*;
use crate::cloud::fake::FakeCloud;
use crate::cloud::template::TemplateError;
use crate::cloud::{CloudError, Stack};
use crate::controller::context::{ScalingStatus, ZoneSubnet};
use crate::controller::resources::fixtures;
use crate::crd::OPERATOR_VERSION;
use std::sync::Mutex;

const CLUSTER_STACK: &str = "cluster-a1b2c-control-plane";

/// Keeps every parameter set it was asked to render
#[derive(Default)]
struct RecordingRenderer {
    rendered: Mutex<Vec<StackParams>>,
}

impl TemplateRenderer for RecordingRenderer {
    fn render(&self, params: &StackParams) -> Result<String, TemplateError> {
        self.rendered.lock().unwrap().push(params.clone());
        Ok("{}".to_string())
    }
}

fn zone(name: &str, public: &str, private: &str) -> AvailabilityZone {
    AvailabilityZone {
        name: name.to_string(),
        public: ZoneSubnet {
            cidr: Some(public.parse().unwrap()),
            id: format!("{}-pub", name),
        },
        private: ZoneSubnet {
            cidr: Some(private.parse().unwrap()),
            id: format!("{}-priv", name),
        },
        route_table_ids: vec![],
    }
}

/// Context of a cluster whose stack matches the fixture's declared state
fn converged_context() -> ReconcileContext {
    let zones = vec![
        zone("eu-central-1a", "10.100.8.0/27", "10.100.8.32/27"),
        zone("eu-central-1b", "10.100.8.64/27", "10.100.8.96/27"),
    ];
    let mut ctx = ReconcileContext::default();
    ctx.spec.availability_zones = zones.clone();
    ctx.status.availability_zones = zones;
    ctx.status.network_cidr = Some("10.100.8.0/24".parse().unwrap());
    ctx.status.account_id = "123456789012".to_string();
    ctx.status.vpc_id = "vpc-1".to_string();
    ctx.status.master_instance_type = "m5.large".to_string();
    ctx.status.worker_instance_type = "m5.xlarge".to_string();
    ctx.status.worker_docker_volume_size_gb = 100;
    ctx.status.operator_version = OPERATOR_VERSION.to_string();
    ctx.status.scaling = ScalingStatus {
        min: 3,
        max: 8,
        desired: 6,
    };
    ctx
}

fn step(cloud: FakeCloud) -> (StackResource, Arc<FakeCloud>, Arc<RecordingRenderer>) {
    let cloud = Arc::new(cloud);
    let renderer = Arc::new(RecordingRenderer::default());
    (
        StackResource::new(cloud.clone(), renderer.clone()),
        cloud,
        renderer,
    )
}

#[tokio::test]
async fn test_creates_missing_stack_and_cancels() {
    let (step, cloud, renderer) = step(FakeCloud::new());
    let mut run = fixtures::run_with(converged_context());

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert_eq!(cloud.mutations(), vec![format!("create_stack:{}", CLUSTER_STACK)]);
    assert!(run.is_canceled());
    assert_eq!(
        run.context().unwrap().status.stack_status,
        Some(StackStatus::CreateInProgress)
    );

    let params = renderer.rendered.lock().unwrap()[0].clone();
    assert_eq!(params.cidr, "10.100.8.0/24");
    assert_eq!(params.vpc_id.as_deref(), Some("vpc-1"));
    assert_eq!(params.master_instance_type.as_deref(), Some("m5.large"));
    assert_eq!(params.availability_zones.len(), 2);
    assert_eq!(params.workers.min_desired, 6);
}

#[tokio::test]
async fn test_cluster_without_zones_cancels_without_creating() {
    let (step, cloud, _) = step(FakeCloud::new());
    let mut ctx = converged_context();
    ctx.spec.availability_zones.clear();
    let mut run = fixtures::run_with(ctx);

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert!(cloud.mutations().is_empty());
    assert!(run.is_canceled());
}

#[tokio::test]
async fn test_missing_range_cancels_without_creating() {
    let (step, cloud, _) = step(FakeCloud::new());
    let mut run = fixtures::run();

    step.ensure_created(&mut run, &fixtures::node_pool("a1b2c", "np1"))
        .await
        .unwrap();

    assert!(cloud.mutations().is_empty());
    assert!(run.is_canceled());
}

#[tokio::test]
async fn test_already_existing_stack_counts_as_created() {
    let cloud = FakeCloud::new();
    cloud.fail_next(CloudError::NotFound("stack".to_string()));
    cloud.fail_next(CloudError::AlreadyExists("stack".to_string()));
    let (step, _, _) = step(cloud);
    let mut run = fixtures::run_with(converged_context());

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert!(run.is_canceled());
}

#[tokio::test]
async fn test_node_pool_stack_uses_computed_zones() {
    let (step, _, renderer) = step(FakeCloud::new());
    let mut ctx = ReconcileContext::default();
    ctx.status.network_cidr = Some("10.100.9.0/24".parse().unwrap());
    ctx.spec.availability_zones = vec![zone("eu-central-1c", "10.100.9.0/27", "10.100.9.32/27")];
    let mut run = fixtures::run_with(ctx);

    step.ensure_created(&mut run, &fixtures::node_pool("a1b2c", "np1"))
        .await
        .unwrap();

    let params = renderer.rendered.lock().unwrap()[0].clone();
    assert_eq!(params.node_pool_id.as_deref(), Some("np1"));
    assert_eq!(params.master_instance_type, None);
    assert_eq!(
        params.availability_zones,
        vec![ZoneParams {
            name: "eu-central-1c".to_string(),
            public_cidr: "10.100.9.0/27".to_string(),
            private_cidr: "10.100.9.32/27".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_transitioning_stack_cancels() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::UpdateInProgress, &[]);
    let (step, cloud, _) = step(cloud);
    let mut run = fixtures::run_with(converged_context());

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert!(run.is_canceled());
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_failed_stack_is_an_error() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::RollbackComplete, &[]);
    let (step, _, _) = step(cloud);
    let mut run = fixtures::run_with(converged_context());

    let result = step
        .ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await;

    assert!(matches!(result, Err(ResourceError::ExecutionFailed(_))));
}

#[tokio::test]
async fn test_two_stacks_are_an_error() {
    let cloud = FakeCloud::new();
    let stack = Stack {
        name: CLUSTER_STACK.to_string(),
        status: StackStatus::CreateComplete,
        outputs: Default::default(),
    };
    cloud
        .state
        .lock()
        .unwrap()
        .stacks
        .insert(CLUSTER_STACK.to_string(), vec![stack.clone(), stack]);
    let (step, _, _) = step(cloud);
    let mut run = fixtures::run_with(converged_context());

    let err = step
        .ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("got 2"));
}

#[tokio::test]
async fn test_converged_stack_is_left_alone() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::UpdateComplete, &[]);
    let (step, cloud, _) = step(cloud);
    let mut run = fixtures::run_with(converged_context());

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert!(cloud.mutations().is_empty());
    assert!(!run.is_canceled());
}

#[tokio::test]
async fn test_changed_worker_type_updates_stack() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::CreateComplete, &[]);
    let (step, cloud, _) = step(cloud);
    let mut ctx = converged_context();
    ctx.status.worker_instance_type = "m4.xlarge".to_string();
    let mut run = fixtures::run_with(ctx);

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert_eq!(cloud.mutations(), vec![format!("update_stack:{}", CLUSTER_STACK)]);
    assert_eq!(
        run.context().unwrap().status.stack_status,
        Some(StackStatus::UpdateInProgress)
    );
    assert!(!run.is_canceled());
}

#[tokio::test]
async fn test_changed_scaling_updates_stack() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::CreateComplete, &[]);
    let (step, cloud, renderer) = step(cloud);
    let mut ctx = converged_context();
    ctx.status.scaling = ScalingStatus {
        min: 3,
        max: 5,
        desired: 5,
    };
    let mut run = fixtures::run_with(ctx);

    step.ensure_created(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert_eq!(cloud.mutations(), vec![format!("update_stack:{}", CLUSTER_STACK)]);
    let params = renderer.rendered.lock().unwrap()[0].clone();
    assert_eq!(params.workers.max_size, 8);
    assert_eq!(params.workers.min_desired, 5);
}

#[tokio::test]
async fn test_deletes_existing_stack_and_cancels() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::UpdateComplete, &[]);
    let (step, cloud, _) = step(cloud);
    let mut run = fixtures::run();

    step.ensure_deleted(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert_eq!(cloud.mutations(), vec![format!("delete_stack:{}", CLUSTER_STACK)]);
    assert!(run.is_canceled());
}

#[tokio::test]
async fn test_deletion_in_progress_cancels() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::DeleteInProgress, &[]);
    let (step, cloud, _) = step(cloud);
    let mut run = fixtures::run();

    step.ensure_deleted(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert!(cloud.mutations().is_empty());
    assert!(run.is_canceled());
}

#[tokio::test]
async fn test_deleted_stack_completes_deletion() {
    let cloud = FakeCloud::new().with_stack(CLUSTER_STACK, StackStatus::DeleteComplete, &[]);
    let (step, cloud, _) = step(cloud);
    let mut run = fixtures::run();

    step.ensure_deleted(&mut run, &fixtures::cluster("a1b2c"))
        .await
        .unwrap();

    assert!(cloud.mutations().is_empty());
    assert!(!run.is_canceled());
}
