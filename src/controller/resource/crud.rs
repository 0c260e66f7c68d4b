//! CRUD contract for steps managing one concrete external object
//!
//! A CRUD step reads the current and the desired state of its object,
//! computes a `Patch` and applies each non-empty part of it. `Crud` adapts
//! such a step to the plain `Resource` contract.

use super::{Resource, ResourceError};
use crate::controller::context::RunContext;
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::debug;

/// Changes needed to converge an object; empty parts are skipped
#[derive(Clone, Debug, PartialEq)]
pub struct Patch<S> {
    pub create: Option<S>,
    pub update: Option<S>,
    pub delete: Option<S>,
}

impl<S> Default for Patch<S> {
    fn default() -> Self {
        Patch {
            create: None,
            update: None,
            delete: None,
        }
    }
}

impl<S> Patch<S> {
    pub fn is_empty(&self) -> bool {
        self.create.is_none() && self.update.is_none() && self.delete.is_none()
    }
}

#[async_trait]
pub trait CrudResource<K: Send + Sync + 'static>: Send + Sync {
    type State: Clone + Debug + Send + Sync;

    fn name(&self) -> &str;

    /// Current state of the object; None when it does not exist
    async fn get_current_state(
        &self,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<Option<Self::State>, ResourceError>;

    async fn get_desired_state(
        &self,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<Self::State, ResourceError>;

    /// Patch for an object that does not exist yet
    fn new_create_patch(&self, desired: &Self::State) -> Patch<Self::State>;

    /// Patch for an existing object
    fn new_update_patch(&self, current: &Self::State, desired: &Self::State)
        -> Patch<Self::State>;

    fn new_delete_patch(
        &self,
        current: Option<&Self::State>,
        desired: &Self::State,
    ) -> Patch<Self::State>;

    async fn apply_create_change(
        &self,
        run: &mut RunContext,
        obj: &K,
        state: &Self::State,
    ) -> Result<(), ResourceError>;

    async fn apply_update_change(
        &self,
        run: &mut RunContext,
        obj: &K,
        state: &Self::State,
    ) -> Result<(), ResourceError>;

    async fn apply_delete_change(
        &self,
        run: &mut RunContext,
        obj: &K,
        state: &Self::State,
    ) -> Result<(), ResourceError>;
}

/// Runs a `CrudResource` as a plain pipeline step
pub struct Crud<R>(pub R);

impl<R> Crud<R> {
    async fn apply<K>(
        &self,
        run: &mut RunContext,
        obj: &K,
        patch: Patch<<R as CrudResource<K>>::State>,
    ) -> Result<(), ResourceError>
    where
        K: Send + Sync + 'static,
        R: CrudResource<K>,
    {
        if patch.is_empty() {
            debug!(resource = %self.0.name(), "Nothing to change");
            return Ok(());
        }
        if let Some(state) = &patch.create {
            self.0.apply_create_change(run, obj, state).await?;
        }
        if let Some(state) = &patch.delete {
            self.0.apply_delete_change(run, obj, state).await?;
        }
        if let Some(state) = &patch.update {
            self.0.apply_update_change(run, obj, state).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<K, R> Resource<K> for Crud<R>
where
    K: Send + Sync + 'static,
    R: CrudResource<K>,
{
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let current = self.0.get_current_state(run, obj).await?;
        let desired = self.0.get_desired_state(run, obj).await?;

        let patch = match &current {
            None => self.0.new_create_patch(&desired),
            Some(current) => self.0.new_update_patch(current, &desired),
        };
        self.apply(run, obj, patch).await
    }

    async fn ensure_deleted(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        let current = self.0.get_current_state(run, obj).await?;
        let desired = self.0.get_desired_state(run, obj).await?;

        let patch = self.0.new_delete_patch(current.as_ref(), &desired);
        self.apply(run, obj, patch).await
    }
}
