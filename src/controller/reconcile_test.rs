use super::*;
use crate::controller::resource::ResourceError;
use crate::ipam::IpamError;

fn meta(finalizers: Option<Vec<&str>>) -> ObjectMeta {
    ObjectMeta {
        name: Some("a1b2c".to_string()),
        namespace: Some("default".to_string()),
        finalizers: finalizers.map(|f| f.into_iter().map(str::to_string).collect()),
        ..Default::default()
    }
}

fn pipeline_error(source: ResourceError) -> ReconcileError {
    ReconcileError::Pipeline(PipelineError {
        resource: "stack".to_string(),
        source,
    })
}

#[test]
fn test_followup_after_creation() {
    assert_eq!(
        followup(Outcome::Completed, false),
        Followup::Requeue(RESYNC_INTERVAL)
    );
    assert_eq!(
        followup(Outcome::Canceled, false),
        Followup::Requeue(CANCELED_REQUEUE)
    );
    assert_eq!(followup(Outcome::Skipped, false), Followup::AwaitChange);
}

#[test]
fn test_followup_after_deletion() {
    assert_eq!(followup(Outcome::Completed, true), Followup::RemoveFinalizer);
    // Stack deletion still running, the object has to stay
    assert_eq!(
        followup(Outcome::Canceled, true),
        Followup::Requeue(CANCELED_REQUEUE)
    );
    assert_eq!(followup(Outcome::Skipped, true), Followup::AwaitChange);
}

#[test]
fn test_has_finalizer() {
    assert!(!has_finalizer(&meta(None)));
    assert!(!has_finalizer(&meta(Some(vec!["other.io/cleanup"]))));
    assert!(has_finalizer(&meta(Some(vec!["other.io/cleanup", FINALIZER]))));
}

#[test]
fn test_finalizers_keep_foreign_entries() {
    let with = finalizers_with(&meta(Some(vec!["other.io/cleanup"])), true);
    assert_eq!(with, vec!["other.io/cleanup", FINALIZER]);

    let again = finalizers_with(&meta(Some(vec![FINALIZER])), true);
    assert_eq!(again, vec![FINALIZER]);

    let without = finalizers_with(&meta(Some(vec![FINALIZER, "other.io/cleanup"])), false);
    assert_eq!(without, vec!["other.io/cleanup"]);

    assert!(finalizers_with(&meta(None), false).is_empty());
}

#[test]
fn test_transient_errors_requeue_quickly() {
    let error = ReconcileError::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "etcdserver: request timed out".to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }));
    assert_eq!(error_requeue(&error), ERROR_REQUEUE);

    let error = pipeline_error(ResourceError::ExecutionFailed(
        "expected exactly one stack cluster-a1b2c-control-plane, got 2".to_string(),
    ));
    assert_eq!(error_requeue(&error), ERROR_REQUEUE);
}

#[test]
fn test_invalid_config_backs_off() {
    for error in [
        pipeline_error(ResourceError::InvalidConfig("no zones".to_string())),
        pipeline_error(ResourceError::Ipam(IpamError::InvalidConfig(
            "network 10.100.0.0/16 has no free /24 range left".to_string(),
        ))),
        ReconcileError::MissingNamespace("a1b2c".to_string()),
    ] {
        assert!(!error.is_retryable(), "{} should not be retryable", error);
        assert_eq!(error_requeue(&error), INVALID_CONFIG_REQUEUE);
    }
}

#[test]
fn test_pipeline_error_names_step() {
    let error = pipeline_error(ResourceError::InvalidConfig("no zones".to_string()));

    assert_eq!(
        error.to_string(),
        "resource stack failed: invalid config: no zones"
    );
}
