use super::resource::{Outcome, PipelineError, ResourceSet};
use super::sets::ResourceSets;
use crate::crd::cluster::TenantCluster;
use crate::crd::node_pool::NodePool;
use crate::store::FIELD_MANAGER;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Keeps declared objects around until their infrastructure is gone
pub const FINALIZER: &str = "strato.io/finalizer";

/// Periodic resync of converged objects
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);
/// Next look at a run canceled while infrastructure transitions
const CANCELED_REQUEUE: Duration = Duration::from_secs(30);
const FINALIZER_REQUEUE: Duration = Duration::from_secs(1);
/// Lifecycle hooks have to be answered before they expire
const DRAIN_INTERVAL: Duration = Duration::from_secs(30);
const ERROR_REQUEUE: Duration = Duration::from_secs(10);
const INVALID_CONFIG_REQUEUE: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{0} missing namespace")]
    MissingNamespace(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::KubeError(_) => true,
            ReconcileError::MissingNamespace(_) => false,
            ReconcileError::Pipeline(e) => e.source.is_retryable(),
        }
    }
}

pub struct Context {
    pub client: Client,
    pub sets: ResourceSets,
}

impl Context {
    pub fn new(client: Client, sets: ResourceSets) -> Self {
        Context { client, sets }
    }
}

/// What the reconciler does after a run of a resource set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Followup {
    Requeue(Duration),
    AwaitChange,
    /// Teardown finished, the object may go
    RemoveFinalizer,
}

pub fn followup(outcome: Outcome, deleting: bool) -> Followup {
    match (outcome, deleting) {
        (Outcome::Completed, true) => Followup::RemoveFinalizer,
        (Outcome::Completed, false) => Followup::Requeue(RESYNC_INTERVAL),
        // Deletion keeps the finalizer until a later run completes
        (Outcome::Canceled, _) => Followup::Requeue(CANCELED_REQUEUE),
        (Outcome::Skipped, _) => Followup::AwaitChange,
    }
}

/// Delay before an object whose run failed is looked at again
pub fn error_requeue(error: &ReconcileError) -> Duration {
    if error.is_retryable() {
        ERROR_REQUEUE
    } else {
        INVALID_CONFIG_REQUEUE
    }
}

fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
}

/// Finalizers of `meta` with ours added or removed, others untouched
fn finalizers_with(meta: &ObjectMeta, present: bool) -> Vec<String> {
    let mut finalizers: Vec<String> = meta
        .finalizers
        .iter()
        .flatten()
        .filter(|name| name.as_str() != FINALIZER)
        .cloned()
        .collect();
    if present {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

async fn patch_finalizers<K>(api: &Api<K>, obj: &K, present: bool) -> Result<(), ReconcileError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers_with(obj.meta(), present)
        }
    });
    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Run `set` for a namespaced object, guarding teardown with the finalizer
async fn reconcile_with_finalizer<K>(
    obj: &K,
    client: &Client,
    set: &ResourceSet<K>,
) -> Result<Action, ReconcileError>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| ReconcileError::MissingNamespace(name.clone()))?;

    if !set.handles(obj) {
        debug!(set = %set.name(), object = %name, "Object handled by another operator version");
        return Ok(Action::await_change());
    }

    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let deleting = obj.meta().deletion_timestamp.is_some();

    if !has_finalizer(obj.meta()) {
        if deleting {
            return Ok(Action::await_change());
        }
        patch_finalizers(&api, obj, true).await?;
        debug!(object = %name, "Added finalizer");
        return Ok(Action::requeue(FINALIZER_REQUEUE));
    }

    info!(set = %set.name(), object = %name, namespace = %namespace, deleting, "Reconciling");

    let outcome = if deleting {
        set.ensure_deleted(obj).await?
    } else {
        set.ensure_created(obj).await?
    };

    match followup(outcome, deleting) {
        Followup::Requeue(delay) => Ok(Action::requeue(delay)),
        Followup::AwaitChange => Ok(Action::await_change()),
        Followup::RemoveFinalizer => {
            patch_finalizers(&api, obj, false).await?;
            info!(object = %name, "Infrastructure deleted, removed finalizer");
            Ok(Action::await_change())
        }
    }
}

pub async fn reconcile_cluster(
    cluster: Arc<TenantCluster>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    reconcile_with_finalizer(cluster.as_ref(), &ctx.client, &ctx.sets.cluster).await
}

pub async fn reconcile_node_pool(
    pool: Arc<NodePool>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    reconcile_with_finalizer(pool.as_ref(), &ctx.client, &ctx.sets.node_pool).await
}

/// Answer lifecycle hooks of the node pool's workers
///
/// Runs next to the node pool reconciler and relies on its finalizer; a
/// deleted pool only has its leftover drainer configs removed.
pub async fn reconcile_drain(
    pool: Arc<NodePool>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let set = &ctx.sets.drain;

    if pool.meta().deletion_timestamp.is_some() {
        set.ensure_deleted(&pool).await?;
        return Ok(Action::await_change());
    }

    match set.ensure_created(&pool).await? {
        Outcome::Skipped => Ok(Action::await_change()),
        Outcome::Completed | Outcome::Canceled => Ok(Action::requeue(DRAIN_INTERVAL)),
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
