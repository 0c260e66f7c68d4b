//! Declarative object store
//!
//! Narrow access to the declared objects and their status sub-resource.
//! The production implementation is backed by the Kubernetes API; status
//! writes are JSON merge patches, last write wins per field.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::debug;

/// Field manager used for every write
pub const FIELD_MANAGER: &str = "strato";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{0} has no namespace")]
    MissingNamespace(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),
}

#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// List all objects of this kind across namespaces
    async fn list(&self) -> Result<Vec<K>, StoreError>;

    /// Fresh read of an object; None once it is gone
    async fn get(&self, obj: &K) -> Result<Option<K>, StoreError>;

    /// Merge-patch the status sub-resource of an object
    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<(), StoreError>;

    async fn create(&self, obj: &K) -> Result<(), StoreError>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, obj: &K) -> Result<(), StoreError>;
}

/// Kubernetes API backed object store
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        KubeStore {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn namespaced_api(&self, obj: &K) -> Result<Api<K>, StoreError> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| StoreError::MissingNamespace(obj.name_any()))?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn list(&self) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get(&self, obj: &K) -> Result<Option<K>, StoreError> {
        let api = self.namespaced_api(obj)?;
        Ok(api.get_opt(&obj.name_any()).await?)
    }

    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<(), StoreError> {
        let api = self.namespaced_api(obj)?;
        let name = obj.name_any();
        debug!(object = %name, "Patching status");

        let patch = serde_json::json!({ "status": status });
        api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn create(&self, obj: &K) -> Result<(), StoreError> {
        let api = self.namespaced_api(obj)?;
        match api.create(&PostParams::default(), obj).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                Err(StoreError::AlreadyExists(obj.name_any()))
            }
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn delete(&self, obj: &K) -> Result<(), StoreError> {
        let api = self.namespaced_api(obj)?;
        match api.delete(&obj.name_any(), &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

/// Kubernetes API backed store for cluster-scoped kinds
pub struct KubeClusterStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeClusterStore<K> {
    pub fn new(client: Client) -> Self {
        KubeClusterStore {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeClusterStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn list(&self) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get(&self, obj: &K) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.get_opt(&obj.name_any()).await?)
    }

    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<(), StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            &obj.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn create(&self, obj: &K) -> Result<(), StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        match api.create(&PostParams::default(), obj).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                Err(StoreError::AlreadyExists(obj.name_any()))
            }
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn delete(&self, obj: &K) -> Result<(), StoreError> {
        let api: Api<K> = Api::all(self.client.clone());
        match api.delete(&obj.name_any(), &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

#[cfg(test)]
pub(crate) mod memory;
