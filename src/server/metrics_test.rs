//! Tests for operator metrics

use super::metrics::{create_metrics, OperatorMetrics};

#[test]
fn test_metrics_creation() {
    let metrics = OperatorMetrics::new().expect("should create metrics");

    // Prometheus only outputs metrics with values
    metrics.record_reconciliation("cluster", "completed");
    metrics.record_resource("ipam", "success", 0.1);
    metrics.record_ipam_allocation("cluster");

    let output = metrics.encode().expect("should encode metrics");
    assert!(output.contains("strato_reconciliations_total"));
    assert!(output.contains("strato_resource_executions_total"));
    assert!(output.contains("strato_resource_duration_seconds"));
    assert!(output.contains("strato_ipam_allocations_total"));
}

#[test]
fn test_record_reconciliation_by_set_and_result() {
    let metrics = OperatorMetrics::new().expect("should create metrics");

    metrics.record_reconciliation("cluster", "completed");
    metrics.record_reconciliation("cluster", "completed");
    metrics.record_reconciliation("cluster", "canceled");
    metrics.record_reconciliation("drain", "skipped");

    let output = metrics.encode().expect("should encode metrics");

    assert!(output.contains("strato_reconciliations_total{result=\"completed\",set=\"cluster\"} 2"));
    assert!(output.contains("strato_reconciliations_total{result=\"canceled\",set=\"cluster\"} 1"));
    assert!(output.contains("strato_reconciliations_total{result=\"skipped\",set=\"drain\"} 1"));
}

#[test]
fn test_record_resource_counts_and_observes() {
    let metrics = OperatorMetrics::new().expect("should create metrics");

    metrics.record_resource("stack", "success", 0.5);
    metrics.record_resource("stack", "error", 1.2);
    metrics.record_resource("vpc", "canceled", 0.3);

    let output = metrics.encode().expect("should encode metrics");

    assert!(output
        .contains("strato_resource_executions_total{resource=\"stack\",result=\"success\"} 1"));
    assert!(
        output.contains("strato_resource_executions_total{resource=\"stack\",result=\"error\"} 1")
    );
    assert!(output.contains("strato_resource_duration_seconds_count{resource=\"stack\"} 2"));
    assert!(output.contains("strato_resource_duration_seconds_count{resource=\"vpc\"} 1"));
}

#[test]
fn test_record_ipam_allocation() {
    let metrics = OperatorMetrics::new().expect("should create metrics");

    metrics.record_ipam_allocation("cluster");
    metrics.record_ipam_allocation("nodepool");
    metrics.record_ipam_allocation("nodepool");

    let output = metrics.encode().expect("should encode metrics");

    assert!(output.contains("strato_ipam_allocations_total{target=\"cluster\"} 1"));
    assert!(output.contains("strato_ipam_allocations_total{target=\"nodepool\"} 2"));
}

#[test]
fn test_create_shared_metrics() {
    let metrics = create_metrics().expect("should create shared metrics");

    // Clones share one registry
    let metrics2 = metrics.clone();
    metrics.record_reconciliation("nodepool", "completed");

    let output = metrics2.encode().expect("should encode from clone");
    assert!(
        output.contains("strato_reconciliations_total{result=\"completed\",set=\"nodepool\"} 1")
    );
}

#[test]
fn test_histogram_buckets() {
    let metrics = OperatorMetrics::new().expect("should create metrics");

    metrics.record_resource("stack", "success", 0.005);
    metrics.record_resource("stack", "success", 0.8);
    metrics.record_resource("stack", "success", 20.0);

    let output = metrics.encode().expect("should encode metrics");

    assert!(output.contains("strato_resource_duration_seconds_bucket{resource=\"stack\",le=\"0.01\"} 1"));
    assert!(output.contains("strato_resource_duration_seconds_bucket{resource=\"stack\",le=\"1\"} 2"));
    assert!(output.contains("strato_resource_duration_seconds_bucket{resource=\"stack\",le=\"30\"} 3"));
    assert!(output.contains("strato_resource_duration_seconds_count{resource=\"stack\"} 3"));
}
