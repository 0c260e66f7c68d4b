//! Reconciliation of tenant clusters and node pools
//!
//! The kube-rs controller runtime calls into [`reconcile`], which hands the
//! object to the matching resource set. A resource set is an ordered
//! pipeline of steps sharing one [`context::RunContext`] per run.

pub mod change;
pub mod context;
mod reconcile;
pub mod resource;
pub mod resources;
pub mod sets;

pub use reconcile::{
    error_requeue, followup, reconcile_cluster, reconcile_drain, reconcile_node_pool, Context,
    Followup, ReconcileError, FINALIZER,
};
