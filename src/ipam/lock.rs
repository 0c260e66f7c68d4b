//! Distributed lock for range allocation
//!
//! Backed by coordination.k8s.io/v1 Lease objects, one per key. A lease is
//! free when it has no holder or its holder stopped renewing it. Every write
//! carries the lease's resourceVersion, so two replicas racing for the same
//! lease can't both win.
//!
//! Each acquisition writes its own holder identity, so a lease taken by one
//! reconciliation is never handed to another one running in the same pod.
//! Acquisitions of the same key within one process also queue on a local
//! mutex before they touch the lease.

use super::IpamError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// How long a held lock stays valid without release
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Delay between acquisition attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Give up acquiring after this long
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Proof of a held lock, handed back on release
#[derive(Debug, Clone, PartialEq)]
pub struct LockHandle {
    pub key: String,
    /// Identity written to the lease by this acquisition
    pub holder: String,
}

#[async_trait]
pub trait Locker: Send + Sync {
    /// Block until the lock for `key` is held
    async fn acquire(&self, key: &str) -> Result<LockHandle, IpamError>;

    async fn release(&self, handle: LockHandle) -> Result<(), IpamError>;
}

/// Lease name for a lock key, restricted to DNS-1123 characters
pub fn lease_name(key: &str) -> String {
    let sanitized: String = key
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("strato-{}", sanitized.trim_matches('-'))
}

/// Renew time of a lease, read through its wire format
fn renew_time(spec: &LeaseSpec) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(spec.renew_time.as_ref()?).ok()?;
    let parsed = DateTime::parse_from_rfc3339(value.as_str()?).ok()?;
    Some(parsed.with_timezone(&Utc))
}

/// Holder identity for one acquisition by the instance `holder_id`
pub fn acquisition_holder(holder_id: &str) -> String {
    format!("{}-{}", holder_id, uuid::Uuid::new_v4().simple())
}

/// Whether a lease can be taken at `now`
///
/// Only released or expired leases are available. A live lease is never
/// available, not even to another acquisition of the same instance.
pub fn is_available(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let Some(spec) = spec else {
        return true;
    };
    if matches!(spec.holder_identity.as_deref(), None | Some("")) {
        return true;
    }

    match (renew_time(spec), spec.lease_duration_seconds) {
        (Some(renew), Some(duration)) => now > renew + chrono::Duration::seconds(duration as i64),
        _ => true,
    }
}

/// Per-key mutexes queuing acquisitions within one process
#[derive(Default)]
pub(crate) struct KeyedGate {
    keys: Mutex<BTreeMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedGate {
    pub(crate) async fn enter(&self, key: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            keys.entry(key.to_string()).or_default().clone()
        };
        gate.lock_owned().await
    }
}

pub struct LeaseLocker {
    api: Api<Lease>,
    holder_id: String,
    lease_duration_seconds: i32,
    poll_interval: Duration,
    acquire_timeout: Duration,
    gate: KeyedGate,
    /// Local gate guards of held locks, by acquisition holder
    entered: Mutex<BTreeMap<String, OwnedMutexGuard<()>>>,
}

impl LeaseLocker {
    pub fn new(client: Client, namespace: &str, holder_id: String) -> Self {
        LeaseLocker {
            api: Api::namespaced(client, namespace),
            holder_id,
            lease_duration_seconds: DEFAULT_LOCK_TTL.as_secs() as i32,
            poll_interval: DEFAULT_POLL_INTERVAL,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            gate: KeyedGate::default(),
            entered: Mutex::new(BTreeMap::new()),
        }
    }

    /// One acquisition attempt; Ok(false) when someone else holds the lease
    async fn try_acquire(&self, name: &str, holder: &str) -> Result<bool, kube::Error> {
        let now = Utc::now();
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        match self.api.get_opt(name).await? {
            Some(existing) => {
                let spec = existing.spec.as_ref();
                if !is_available(spec, now) {
                    debug!(
                        lease = %name,
                        holder = ?spec.and_then(|s| s.holder_identity.as_ref()),
                        "Lock held by another run"
                    );
                    return Ok(false);
                }

                let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
                let patch = serde_json::json!({
                    "metadata": {
                        "resourceVersion": existing.metadata.resource_version
                    },
                    "spec": {
                        "holderIdentity": holder,
                        "acquireTime": timestamp,
                        "renewTime": timestamp,
                        "leaseDurationSeconds": self.lease_duration_seconds,
                        "leaseTransitions": transitions + 1
                    }
                });

                match self
                    .api
                    .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(err)) if err.code == 409 => {
                        debug!(lease = %name, "Lost race for lock");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!(lease = %name, "Creating lock lease");
                let lease: Lease = serde_json::from_value(serde_json::json!({
                    "metadata": { "name": name },
                    "spec": {
                        "holderIdentity": holder,
                        "acquireTime": timestamp,
                        "renewTime": timestamp,
                        "leaseDurationSeconds": self.lease_duration_seconds,
                        "leaseTransitions": 0
                    }
                }))
                .map_err(kube::Error::SerdeError)?;

                match self.api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

#[async_trait]
impl Locker for LeaseLocker {
    async fn acquire(&self, key: &str) -> Result<LockHandle, IpamError> {
        let name = lease_name(key);
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;

        let entered = tokio::time::timeout_at(deadline, self.gate.enter(key))
            .await
            .map_err(|_| {
                IpamError::Lock(format!(
                    "timed out after {:?} waiting for {} in this process",
                    self.acquire_timeout, name
                ))
            })?;
        let holder = acquisition_holder(&self.holder_id);

        loop {
            match self.try_acquire(&name, &holder).await {
                Ok(true) => {
                    debug!(lease = %name, holder = %holder, "Acquired lock");
                    self.entered
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(holder.clone(), entered);
                    return Ok(LockHandle {
                        key: key.to_string(),
                        holder,
                    });
                }
                Ok(false) => {}
                Err(e) => warn!(lease = %name, error = %e, "Lock acquisition error"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(IpamError::Lock(format!(
                    "timed out after {:?} waiting for {}",
                    self.acquire_timeout, name
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), IpamError> {
        let name = lease_name(&handle.key);
        // The local gate opens once this returns, whatever the lease outcome
        let _entered = self
            .entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.holder);

        let existing = self
            .api
            .get_opt(&name)
            .await
            .map_err(|e| IpamError::Lock(format!("reading {}: {}", name, e)))?;

        let holder = existing
            .as_ref()
            .and_then(|l| l.spec.as_ref())
            .and_then(|s| s.holder_identity.as_deref());
        if holder != Some(handle.holder.as_str()) {
            warn!(lease = %name, holder = ?holder, "Lock no longer held on release");
            return Ok(());
        }

        let patch = serde_json::json!({ "spec": { "holderIdentity": null, "renewTime": null } });
        self.api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| IpamError::Lock(format!("releasing {}: {}", name, e)))?;

        debug!(lease = %name, "Released lock");
        Ok(())
    }
}

/// In-process locker for tests
#[cfg(test)]
pub(crate) mod memory {
    #![allow(clippy::unwrap_used)]

    use super::{LockHandle, Locker};
    use crate::ipam::IpamError;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    pub struct MemoryLocker {
        pub held: Mutex<BTreeSet<String>>,
        pub acquisitions: Mutex<u32>,
        pub releases: Mutex<u32>,
        /// Fail every release after dropping the lock
        pub fail_releases: Mutex<bool>,
    }

    impl MemoryLocker {
        pub fn is_held(&self, key: &str) -> bool {
            self.held.lock().unwrap().contains(key)
        }
    }

    #[async_trait]
    impl Locker for MemoryLocker {
        async fn acquire(&self, key: &str) -> Result<LockHandle, IpamError> {
            loop {
                if self.held.lock().unwrap().insert(key.to_string()) {
                    *self.acquisitions.lock().unwrap() += 1;
                    return Ok(LockHandle {
                        key: key.to_string(),
                        holder: format!("memory-{}", key),
                    });
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        async fn release(&self, handle: LockHandle) -> Result<(), IpamError> {
            self.held.lock().unwrap().remove(&handle.key);
            *self.releases.lock().unwrap() += 1;
            if *self.fail_releases.lock().unwrap() {
                return Err(IpamError::Lock(format!("releasing {}: unavailable", handle.key)));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
