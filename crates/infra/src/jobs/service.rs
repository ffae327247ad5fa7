//! Producer-side entry points: submit a job, poll a job.

use std::sync::Arc;

use tracing::{info, warn};

use uploader_core::{AccessToken, Job, JobId, JobKind, JobSnapshot};

use super::queue::{EnqueueError, JobSender};
use super::registry::{JobHandle, JobRegistry, RegistryError};
use super::store::{JobStore, JobStoreError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
}

/// What the HTTP layer talks to.
///
/// `submit` returns as soon as the job is persisted and queued; it never waits
/// on execution. `get` goes through the registry, so it sweeps expired jobs
/// and reads the latest snapshot from the store.
pub struct JobService<S: JobStore> {
    store: S,
    registry: Arc<JobRegistry<S>>,
    queue: JobSender,
}

impl<S: JobStore + Clone> JobService<S> {
    pub fn new(store: S, registry: Arc<JobRegistry<S>>, queue: JobSender) -> Self {
        Self {
            store,
            registry,
            queue,
        }
    }

    pub fn submit(
        &self,
        kind: JobKind,
        token: AccessToken,
        payload: serde_json::Value,
        context_id: Option<String>,
    ) -> Result<JobId, SubmitError> {
        let job = Job::new(kind, token, payload, context_id);
        let id = job.id();

        self.store.save(&job)?;
        self.registry.register(&job);
        if let Err(e) = self.queue.enqueue(job) {
            // Nothing will ever run it; don't leave a job stuck in Queued.
            self.registry.forget(id);
            if let Err(del) = self.store.delete(id) {
                warn!(job_id = %id, error = %del, "failed to remove unqueued job");
            }
            return Err(e.into());
        }

        info!(job_id = %id, kind = %kind, "job queued");
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Result<JobSnapshot, RegistryError> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<JobHandle> {
        self.registry.list()
    }

    pub fn registry(&self) -> &Arc<JobRegistry<S>> {
        &self.registry
    }
}

impl<S: JobStore> std::fmt::Debug for JobService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService")
            .field("registry", &self.registry)
            .finish()
    }
}
