//! Declared objects for step tests
#![allow(clippy::unwrap_used)] // Test helper can use unwrap

use crate::controller::context::{ReconcileContext, RunContext};
use crate::crd::cluster::{
    MasterSpec, TenantCluster, TenantClusterSpec, TenantClusterStatus, WorkerSpec,
};
use crate::crd::node_pool::{NodePool, NodePoolSpec, NodePoolStatus};
use crate::crd::{NetworkStatus, ScalingSpec, OPERATOR_VERSION, OPERATOR_VERSION_LABEL};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("default".to_string()),
        labels: Some(BTreeMap::from([(
            OPERATOR_VERSION_LABEL.to_string(),
            OPERATOR_VERSION.to_string(),
        )])),
        ..Default::default()
    }
}

/// Cluster with masters in "a" and workers in "a" and "b"
pub fn cluster(id: &str) -> TenantCluster {
    let mut cluster = TenantCluster::new(
        id,
        TenantClusterSpec {
            cluster_id: id.to_string(),
            region: "eu-central-1".to_string(),
            master: MasterSpec {
                instance_type: "m5.large".to_string(),
                availability_zones: vec!["eu-central-1a".to_string()],
            },
            workers: WorkerSpec {
                instance_type: "m5.xlarge".to_string(),
                docker_volume_size_gb: 100,
                scaling: ScalingSpec { min: 3, max: 8 },
                availability_zones: vec![
                    "eu-central-1a".to_string(),
                    "eu-central-1b".to_string(),
                ],
            },
        },
    );
    cluster.metadata = meta(id);
    cluster
}

pub fn cluster_with_cidr(id: &str, cidr: &str) -> TenantCluster {
    let mut cluster = cluster(id);
    cluster.status = Some(TenantClusterStatus {
        network: Some(NetworkStatus {
            cidr: cidr.to_string(),
        }),
        ..Default::default()
    });
    cluster
}

pub fn node_pool(cluster_id: &str, id: &str) -> NodePool {
    let name = format!("{}-{}", cluster_id, id);
    let mut pool = NodePool::new(
        &name,
        NodePoolSpec {
            cluster_id: cluster_id.to_string(),
            node_pool_id: id.to_string(),
            instance_type: "m5.2xlarge".to_string(),
            docker_volume_size_gb: 50,
            scaling: ScalingSpec { min: 1, max: 5 },
            availability_zones: vec!["eu-central-1c".to_string()],
        },
    );
    pool.metadata = meta(&name);
    pool
}

pub fn node_pool_with_cidr(cluster_id: &str, id: &str, cidr: &str) -> NodePool {
    let mut pool = node_pool(cluster_id, id);
    pool.status = Some(NodePoolStatus {
        network: Some(NetworkStatus {
            cidr: cidr.to_string(),
        }),
        ..Default::default()
    });
    pool
}

pub fn run() -> RunContext {
    RunContext::new().with_context(ReconcileContext::default())
}

pub fn run_with(ctx: ReconcileContext) -> RunContext {
    RunContext::new().with_context(ctx)
}
