//! In-memory object store for unit tests
#![allow(clippy::unwrap_used)] // Test helper can use unwrap

use super::{ObjectStore, StoreError};
use async_trait::async_trait;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Mutex;

pub struct MemoryStore<K> {
    pub objects: Mutex<Vec<K>>,
    /// Status patches applied, in order
    pub patches: Mutex<Vec<serde_json::Value>>,
    /// Number of upcoming status patches that fail
    pub failing_patches: Mutex<u32>,
}

impl<K: Clone> MemoryStore<K> {
    pub fn new(objects: Vec<K>) -> Self {
        MemoryStore {
            objects: Mutex::new(objects),
            patches: Mutex::new(Vec::new()),
            failing_patches: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<K> {
        self.objects.lock().unwrap().clone()
    }

    pub fn fail_next_patches(&self, count: u32) {
        *self.failing_patches.lock().unwrap() = count;
    }
}

/// RFC 7386 JSON merge patch
pub fn merge(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match patch {
        serde_json::Value::Object(fields) => {
            if !target.is_object() {
                *target = serde_json::Value::Object(serde_json::Map::new());
            }
            if let serde_json::Value::Object(map) = target {
                for (key, value) in fields {
                    if value.is_null() {
                        map.remove(key);
                    } else {
                        merge(
                            map.entry(key.clone()).or_insert(serde_json::Value::Null),
                            value,
                        );
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: kube::Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Vec<K>, StoreError> {
        Ok(self.snapshot())
    }

    async fn get(&self, obj: &K) -> Result<Option<K>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.name_any() == obj.name_any() && o.namespace() == obj.namespace())
            .cloned())
    }

    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<(), StoreError> {
        {
            let mut failing = self.failing_patches.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::NotFound(format!(
                    "injected failure patching {}",
                    obj.name_any()
                )));
            }
        }

        let mut objects = self.objects.lock().unwrap();
        let existing = objects
            .iter_mut()
            .find(|o| o.name_any() == obj.name_any() && o.namespace() == obj.namespace())
            .ok_or_else(|| StoreError::NotFound(obj.name_any()))?;

        let mut value = serde_json::to_value(&*existing).unwrap();
        merge(&mut value, &serde_json::json!({ "status": status }));
        *existing = serde_json::from_value(value).unwrap();

        self.patches.lock().unwrap().push(status);
        Ok(())
    }

    async fn create(&self, obj: &K) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        if objects
            .iter()
            .any(|o| o.name_any() == obj.name_any() && o.namespace() == obj.namespace())
        {
            return Err(StoreError::AlreadyExists(obj.name_any()));
        }
        objects.push(obj.clone());
        Ok(())
    }

    async fn delete(&self, obj: &K) -> Result<(), StoreError> {
        self.objects
            .lock()
            .unwrap()
            .retain(|o| !(o.name_any() == obj.name_any() && o.namespace() == obj.namespace()));
        Ok(())
    }
}
