//! Per-cluster namespace
//!
//! Tenant objects living in the management cluster are grouped into one
//! namespace named after the cluster id. Implemented as a CRUD step: the
//! namespace is created when missing and deleted with the cluster.

use crate::controller::context::RunContext;
use crate::controller::resource::{CrudResource, Patch, ResourceError};
use crate::crd::cluster::TenantCluster;
use crate::crd::CLUSTER_ID_LABEL;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct NamespaceResource {
    namespaces: Arc<dyn ObjectStore<Namespace>>,
}

impl NamespaceResource {
    pub fn new(namespaces: Arc<dyn ObjectStore<Namespace>>) -> Self {
        NamespaceResource { namespaces }
    }
}

fn desired_namespace(cluster: &TenantCluster) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(cluster.spec.cluster_id.clone()),
            labels: Some(BTreeMap::from([(
                CLUSTER_ID_LABEL.to_string(),
                cluster.spec.cluster_id.clone(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[async_trait]
impl CrudResource<TenantCluster> for NamespaceResource {
    type State = Namespace;

    fn name(&self) -> &str {
        "namespace"
    }

    async fn get_current_state(
        &self,
        _run: &mut RunContext,
        obj: &TenantCluster,
    ) -> Result<Option<Namespace>, ResourceError> {
        Ok(self.namespaces.get(&desired_namespace(obj)).await?)
    }

    async fn get_desired_state(
        &self,
        _run: &mut RunContext,
        obj: &TenantCluster,
    ) -> Result<Namespace, ResourceError> {
        Ok(desired_namespace(obj))
    }

    fn new_create_patch(&self, desired: &Namespace) -> Patch<Namespace> {
        Patch {
            create: Some(desired.clone()),
            ..Default::default()
        }
    }

    fn new_update_patch(&self, _current: &Namespace, _desired: &Namespace) -> Patch<Namespace> {
        Patch::default()
    }

    fn new_delete_patch(
        &self,
        current: Option<&Namespace>,
        _desired: &Namespace,
    ) -> Patch<Namespace> {
        Patch {
            delete: current.cloned(),
            ..Default::default()
        }
    }

    async fn apply_create_change(
        &self,
        _run: &mut RunContext,
        _obj: &TenantCluster,
        state: &Namespace,
    ) -> Result<(), ResourceError> {
        let name = state.metadata.name.clone().unwrap_or_default();
        match self.namespaces.create(state).await {
            Ok(()) => info!(namespace = %name, "Created cluster namespace"),
            Err(StoreError::AlreadyExists(_)) => {
                debug!(namespace = %name, "Cluster namespace already exists")
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn apply_update_change(
        &self,
        _run: &mut RunContext,
        _obj: &TenantCluster,
        _state: &Namespace,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        _run: &mut RunContext,
        _obj: &TenantCluster,
        state: &Namespace,
    ) -> Result<(), ResourceError> {
        self.namespaces.delete(state).await?;
        info!(
            namespace = %state.metadata.name.as_deref().unwrap_or_default(),
            "Deleted cluster namespace"
        );
        Ok(())
    }
}
