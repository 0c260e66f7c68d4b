//! Change detection
//!
//! Decides whether infrastructure has to be updated or scaled. Updating a
//! stack can replace masters and workers, so only an explicit list of fields
//! is compared: availability zones, master instance type, worker docker
//! volume size, worker instance type and operator version. Any other
//! difference between declared and live state is ignored.
//!
//! These functions only read values earlier steps put into the context.

use super::context::{AvailabilityZone, ContextError, RunContext};
use crate::crd::cluster::TenantCluster;
use crate::crd::node_pool::NodePool;
use crate::crd::{operator_version_label, ScalingSpec, OPERATOR_VERSION};
use tracing::info;

/// Declared worker configuration compared against live state
pub trait DeclaredWorkers {
    fn scaling(&self) -> ScalingSpec;

    /// None for objects without a control plane
    fn master_instance_type(&self) -> Option<&str>;

    fn worker_instance_type(&self) -> &str;

    fn worker_docker_volume_size_gb(&self) -> i32;

    /// Operator version the object should be reconciled with
    fn operator_version(&self) -> &str;
}

impl DeclaredWorkers for TenantCluster {
    fn scaling(&self) -> ScalingSpec {
        self.spec.workers.scaling
    }

    fn master_instance_type(&self) -> Option<&str> {
        Some(&self.spec.master.instance_type)
    }

    fn worker_instance_type(&self) -> &str {
        &self.spec.workers.instance_type
    }

    fn worker_docker_volume_size_gb(&self) -> i32 {
        self.spec.workers.docker_volume_size_gb
    }

    fn operator_version(&self) -> &str {
        operator_version_label(&self.metadata).unwrap_or(OPERATOR_VERSION)
    }
}

impl DeclaredWorkers for NodePool {
    fn scaling(&self) -> ScalingSpec {
        self.spec.scaling
    }

    fn master_instance_type(&self) -> Option<&str> {
        None
    }

    fn worker_instance_type(&self) -> &str {
        &self.spec.instance_type
    }

    fn worker_docker_volume_size_gb(&self) -> i32 {
        self.spec.docker_volume_size_gb
    }

    fn operator_version(&self) -> &str {
        operator_version_label(&self.metadata).unwrap_or(OPERATOR_VERSION)
    }
}

/// Field-wise AZ equality: names, CIDRs and subnet ids of both kinds
///
/// Route tables are not part of the comparison.
pub fn availability_zones_equal(a: &[AvailabilityZone], b: &[AvailabilityZone]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut a: Vec<&AvailabilityZone> = a.iter().collect();
    let mut b: Vec<&AvailabilityZone> = b.iter().collect();
    a.sort_by(|x, y| x.name.cmp(&y.name));
    b.sort_by(|x, y| x.name.cmp(&y.name));

    a.iter().zip(b.iter()).all(|(x, y)| {
        x.name == y.name
            && x.public.cidr == y.public.cidr
            && x.public.id == y.public.id
            && x.private.cidr == y.private.cidr
            && x.private.id == y.private.id
    })
}

/// True when the live autoscaling bounds differ from the declared ones
///
/// Empty live bounds mean the group does not exist yet, which is not a
/// reason to scale.
pub fn should_scale<D: DeclaredWorkers>(run: &RunContext, obj: &D) -> Result<bool, ContextError> {
    let ctx = run.context()?;
    let live = ctx.status.scaling;

    if live.is_empty() {
        return Ok(false);
    }

    let declared = obj.scaling();
    if live.min != declared.min || live.max != declared.max {
        info!(
            live_min = live.min,
            live_max = live.max,
            declared_min = declared.min,
            declared_max = declared.max,
            "Detected scaling change"
        );
        return Ok(true);
    }

    Ok(false)
}

/// True when one of the whitelisted fields differs between live and declared state
pub fn should_update<D: DeclaredWorkers>(run: &RunContext, obj: &D) -> Result<bool, ContextError> {
    let ctx = run.context()?;
    let status = &ctx.status;

    if !availability_zones_equal(&ctx.spec.availability_zones, &status.availability_zones) {
        info!(
            desired = ctx.spec.availability_zones.len(),
            live = status.availability_zones.len(),
            "Detected update: availability zones changed"
        );
        return Ok(true);
    }

    if let Some(master) = obj.master_instance_type() {
        if status.master_instance_type != master {
            info!(
                live = %status.master_instance_type,
                declared = %master,
                "Detected update: master instance type changed"
            );
            return Ok(true);
        }
    }

    if status.worker_docker_volume_size_gb != obj.worker_docker_volume_size_gb() {
        info!(
            live = status.worker_docker_volume_size_gb,
            declared = obj.worker_docker_volume_size_gb(),
            "Detected update: worker docker volume size changed"
        );
        return Ok(true);
    }

    if status.worker_instance_type != obj.worker_instance_type() {
        info!(
            live = %status.worker_instance_type,
            declared = %obj.worker_instance_type(),
            "Detected update: worker instance type changed"
        );
        return Ok(true);
    }

    if status.operator_version != obj.operator_version() {
        info!(
            live = %status.operator_version,
            declared = %obj.operator_version(),
            "Detected update: operator version changed"
        );
        return Ok(true);
    }

    Ok(false)
}

/// Lower bound for the desired worker count passed to the autoscaling group
///
/// A live desired capacity above the declared maximum is clamped to the
/// maximum; a live desired capacity above the declared minimum is kept so an
/// update doesn't scale down workers the autoscaler added.
pub fn min_desired_workers(min: i32, max: i32, live_desired: i32) -> i32 {
    if live_desired > max {
        return max;
    }
    if live_desired > min {
        return live_desired;
    }
    min
}

#[cfg(test)]
#[path = "change_test.rs"]
mod tests;
