//! Pipeline steps
//!
//! Each step converges one piece of tenant infrastructure. Discovery steps
//! only read the cloud provider and fill the context; the `stack` step is
//! the only one mutating infrastructure, and `status` writes the result
//! back to the declared object.

pub mod accountid;
pub mod asg;
pub mod drainer;
pub mod drainfinisher;
pub mod namespace;
pub mod stack;
pub mod stackoutput;
pub mod status;
pub mod subnets;
pub mod vpc;
pub mod zones;

use super::change::DeclaredWorkers;
use crate::crd::cluster::TenantCluster;
use crate::crd::node_pool::NodePool;
use std::fmt::Debug;

/// Declared object owning a stack: a tenant cluster or one of its node pools
pub trait InfraTarget:
    kube::Resource<DynamicType = ()> + DeclaredWorkers + Clone + Debug + Send + Sync + 'static
{
    /// Label value naming the kind in logs and metrics
    const KIND: &'static str;

    fn cluster_id(&self) -> &str;

    /// None for the cluster itself
    fn node_pool_id(&self) -> Option<&str>;

    fn stack_name(&self) -> String;

    /// Autoscaling group of the workers in the stack
    fn asg_name(&self) -> String;

    /// Recorded range, if any
    fn network_cidr(&self) -> Option<&str>;

    /// Declared availability zones, sorted and deduplicated
    fn availability_zone_names(&self) -> Vec<String>;
}

fn sorted_names<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut names: Vec<String> = names.cloned().collect();
    names.sort();
    names.dedup();
    names
}

impl InfraTarget for TenantCluster {
    const KIND: &'static str = "cluster";

    fn cluster_id(&self) -> &str {
        &self.spec.cluster_id
    }

    fn node_pool_id(&self) -> Option<&str> {
        None
    }

    fn stack_name(&self) -> String {
        TenantCluster::stack_name(self)
    }

    fn asg_name(&self) -> String {
        self.worker_asg_name()
    }

    fn network_cidr(&self) -> Option<&str> {
        TenantCluster::network_cidr(self)
    }

    fn availability_zone_names(&self) -> Vec<String> {
        sorted_names(
            self.spec
                .master
                .availability_zones
                .iter()
                .chain(self.spec.workers.availability_zones.iter()),
        )
    }
}

impl InfraTarget for NodePool {
    const KIND: &'static str = "nodepool";

    fn cluster_id(&self) -> &str {
        &self.spec.cluster_id
    }

    fn node_pool_id(&self) -> Option<&str> {
        Some(&self.spec.node_pool_id)
    }

    fn stack_name(&self) -> String {
        NodePool::stack_name(self)
    }

    fn asg_name(&self) -> String {
        NodePool::asg_name(self)
    }

    fn network_cidr(&self) -> Option<&str> {
        NodePool::network_cidr(self)
    }

    fn availability_zone_names(&self) -> Vec<String> {
        sorted_names(self.spec.availability_zones.iter())
    }
}

#[cfg(test)]
pub(crate) mod fixtures;
