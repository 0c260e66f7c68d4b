pub mod cloud;
pub mod config;
pub mod controller;
pub mod crd;
pub mod ipam;
pub mod server;
pub mod store;

// Re-export for main.rs tests
pub use crate::controller::{
    error_requeue, reconcile_cluster, reconcile_drain, reconcile_node_pool, Context,
    ReconcileError,
};
