//! Per-reconciliation context
//!
//! Every run of a resource set starts with a fresh `RunContext`. Steps read
//! what earlier steps discovered and record what later steps need, so the
//! order of a resource set is a hard dependency: a step that needs the VPC id
//! has to come after the step that discovers it.
//!
//! The context is scratch space, never a source of truth. It is dropped at
//! the end of the run and steps only ever borrow it for their own call.

use crate::cloud::{RouteTable, SecurityGroup, StackStatus, Subnet};
use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContextError {
    #[error("reconcile context not found")]
    NotFound,
}

/// Subnet of one kind in an availability zone
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneSubnet {
    pub cidr: Option<Ipv4Net>,
    /// Provider id once the subnet exists
    pub id: String,
}

/// Public/private subnet pair of an availability zone
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AvailabilityZone {
    pub name: String,
    pub public: ZoneSubnet,
    pub private: ZoneSubnet,
    pub route_table_ids: Vec<String>,
}

/// Desired values computed from the declared object, used for diffing
#[derive(Clone, Debug, Default)]
pub struct ContextSpec {
    /// Sorted by name
    pub availability_zones: Vec<AvailabilityZone>,
}

/// Bounds of an autoscaling group; all zero while the group does not exist
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScalingStatus {
    pub min: i32,
    pub max: i32,
    pub desired: i32,
}

impl ScalingStatus {
    /// True while nothing has been discovered yet
    pub fn is_empty(&self) -> bool {
        *self == ScalingStatus::default()
    }
}

/// Live values discovered from the cloud provider
#[derive(Clone, Debug, Default)]
pub struct ContextStatus {
    pub account_id: String,
    pub vpc_id: String,
    pub subnets: Vec<Subnet>,
    pub route_tables: Vec<RouteTable>,
    pub security_groups: Vec<SecurityGroup>,
    /// AZs with a complete public/private subnet pair, sorted by name
    pub availability_zones: Vec<AvailabilityZone>,
    pub scaling: ScalingStatus,
    pub master_instance_type: String,
    pub worker_instance_type: String,
    pub worker_docker_volume_size_gb: i32,
    pub operator_version: String,
    /// State of the infrastructure stack; None while it does not exist
    pub stack_status: Option<StackStatus>,
    /// Range allocated to the reconciled object, recorded or just persisted
    pub network_cidr: Option<Ipv4Net>,
    /// Range picked by the allocator but not persisted yet
    pub pending_allocation: Option<Ipv4Net>,
}

/// Spec and status shared by all steps of one run
#[derive(Clone, Debug, Default)]
pub struct ReconcileContext {
    pub spec: ContextSpec,
    pub status: ContextStatus,
}

impl ReconcileContext {
    /// Derive the live AZ mapping from discovered subnets and route tables
    ///
    /// Only AZs with both a public and a private subnet are reported.
    pub fn live_availability_zones(&self) -> Vec<AvailabilityZone> {
        let mut zones: BTreeMap<&str, AvailabilityZone> = BTreeMap::new();

        for subnet in &self.status.subnets {
            let zone = zones
                .entry(subnet.availability_zone.as_str())
                .or_insert_with(|| AvailabilityZone {
                    name: subnet.availability_zone.clone(),
                    ..Default::default()
                });
            let target = match subnet.kind {
                crate::cloud::SubnetKind::Public => &mut zone.public,
                crate::cloud::SubnetKind::Private => &mut zone.private,
            };
            target.cidr = Some(subnet.cidr);
            target.id = subnet.id.clone();
        }

        for table in &self.status.route_tables {
            if let Some(zone) = zones.get_mut(table.availability_zone.as_str()) {
                zone.route_table_ids.push(table.id.clone());
            }
        }

        zones
            .into_values()
            .filter(|z| z.public.cidr.is_some() && z.private.cidr.is_some())
            .map(|mut z| {
                z.route_table_ids.sort();
                z
            })
            .collect()
    }
}

/// Handle threaded through every step of one run
///
/// Carries the attached `ReconcileContext` and the cancellation flag.
#[derive(Debug, Default)]
pub struct RunContext {
    reconcile: Option<ReconcileContext>,
    canceled: bool,
}

impl RunContext {
    /// A run without an attached reconcile context
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a reconcile context, replacing any previous one
    pub fn with_context(mut self, value: ReconcileContext) -> Self {
        self.reconcile = Some(value);
        self
    }

    pub fn context(&self) -> Result<&ReconcileContext, ContextError> {
        self.reconcile.as_ref().ok_or(ContextError::NotFound)
    }

    pub fn context_mut(&mut self) -> Result<&mut ReconcileContext, ContextError> {
        self.reconcile.as_mut().ok_or(ContextError::NotFound)
    }

    /// Stop the run after the current step
    ///
    /// Canceling is not a failure: the run reports success and the next
    /// trigger starts over.
    pub fn cancel_reconciliation(&mut self) {
        self.canceled = true;
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
