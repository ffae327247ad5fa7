//! Outstanding-job registry with lazy expiry.
//!
//! The registry knows which ids this process handed out. Status always comes
//! from the store, because the worker may have advanced a job since it was
//! registered. Every lookup first sweeps out finished jobs older than the
//! retention window, deleting their snapshots too.
//!
//! Sweeping only evicts; it never rewrites a cached handle. The cached
//! snapshot is refreshed by `get` alone, so a read that happens to expire
//! other jobs has no side effect on the survivors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use uploader_core::{Job, JobId, JobKind, JobSnapshot};

use super::store::{JobStore, JobStoreError};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Store(JobStoreError),
}

/// What the registry remembers about one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub id: JobId,
    pub kind: JobKind,
    /// Last snapshot this process observed; possibly stale.
    pub last_seen: JobSnapshot,
}

pub struct JobRegistry<S: JobStore> {
    store: S,
    retention: Duration,
    entries: RwLock<HashMap<JobId, JobHandle>>,
}

impl<S: JobStore> JobRegistry<S> {
    pub fn new(store: S, retention: Duration) -> Self {
        Self {
            store,
            retention,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Track a freshly created job.
    pub fn register(&self, job: &Job) {
        self.register_handle(JobHandle {
            id: job.id(),
            kind: job.kind(),
            last_seen: job.snapshot(),
        });
    }

    pub fn register_handle(&self, handle: JobHandle) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, handle);
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep, then return the current persisted state of `id`.
    pub fn get(&self, id: JobId) -> Result<JobSnapshot, RegistryError> {
        self.get_at(id, Utc::now())
    }

    /// As [`get`](Self::get), with the sweep evaluated at `now`.
    pub fn get_at(&self, id: JobId, now: DateTime<Utc>) -> Result<JobSnapshot, RegistryError> {
        self.sweep_at(now);

        if !self.contains(id) {
            return Err(RegistryError::NotFound(id));
        }

        match self.store.load(id) {
            Ok(snapshot) => {
                if let Some(handle) = self
                    .entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_mut(&id)
                {
                    handle.last_seen = snapshot.clone();
                }
                Ok(snapshot)
            }
            Err(JobStoreError::NotFound(_)) => {
                self.forget(id);
                Err(RegistryError::NotFound(id))
            }
            Err(e) => Err(RegistryError::Store(e)),
        }
    }

    /// Evict every finished job whose end is older than the retention window.
    ///
    /// Unreadable records are dropped from the registry too; their files stay
    /// on disk for inspection. Linear in the number of registered jobs.
    /// Returns how many were evicted.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ids: Vec<JobId> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();

        let mut evicted = 0;
        for id in ids {
            match self.store.load(id) {
                Ok(snapshot) if snapshot.is_expired(now, self.retention) => {
                    if let Err(e) = self.store.delete(id) {
                        warn!(job_id = %id, error = %e, "failed to delete expired job");
                        continue;
                    }
                    self.forget(id);
                    evicted += 1;
                    info!(job_id = %id, "expired job removed");
                }
                Ok(_) => {}
                Err(JobStoreError::NotFound(_)) => {
                    self.forget(id);
                    evicted += 1;
                    debug!(job_id = %id, "job snapshot vanished; dropped from registry");
                }
                Err(e @ JobStoreError::Corrupt { .. }) => {
                    self.forget(id);
                    evicted += 1;
                    warn!(job_id = %id, error = %e, "corrupt job record dropped from registry");
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "could not read job during sweep");
                }
            }
        }
        evicted
    }

    /// Cached view of every outstanding job, oldest first. Does not sweep.
    pub fn list(&self) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        handles.sort_by_key(|h| h.id);
        handles
    }

    /// Drop `id` from the registry without touching the store.
    pub fn forget(&self, id: JobId) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

impl<S: JobStore> std::fmt::Debug for JobRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("retention", &self.retention)
            .field("entries", &self.len())
            .finish()
    }
}
