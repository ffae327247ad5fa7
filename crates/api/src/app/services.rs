use std::io;
use std::sync::Arc;

use uploader_infra::{
    config::{Environment, Settings},
    jobs::{
        job_queue, FileJobStore, JobRegistry, JobService, JobStoreError, JobWorker, WorkerHandle,
        WorkerStatsHandle,
    },
    operations::{standard_dispatcher, RegistryClient, RegistryQueries},
};

pub type Store = Arc<FileJobStore>;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot open job store: {0}")]
    Store(#[from] JobStoreError),
    #[error("cannot spawn job worker: {0}")]
    Worker(#[from] io::Error),
}

/// Everything request handlers need.
pub struct AppServices {
    pub jobs: JobService<Store>,
    pub environment: Arc<Environment>,
    pub worker_stats: WorkerStatsHandle,
    /// Read-only registry lookups; blocking.
    pub registry: Arc<dyn RegistryQueries>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("jobs", &self.jobs)
            .field("environment", &self.environment)
            .field("worker_stats", &self.worker_stats)
            .finish_non_exhaustive()
    }
}

/// Open the store, start the worker, and wire the submit/poll service.
///
/// The worker stops once the returned `AppServices` (and with it the queue's
/// only sender) is dropped; join it through the returned handle.
pub fn build_services<R>(
    settings: &Settings,
    registry: Arc<R>,
) -> Result<(AppServices, WorkerHandle), StartupError>
where
    R: RegistryClient + RegistryQueries + 'static,
{
    let store: Store = Arc::new(FileJobStore::open(&settings.jobs_dir)?);
    let environment = Arc::new(settings.environment.clone());

    let (tx, rx) = job_queue();
    let worker = JobWorker::new(store.clone(), standard_dispatcher(registry.clone()), environment.clone())
        .spawn(rx)?;

    let job_registry = Arc::new(JobRegistry::new(store.clone(), settings.job_expiry));
    let services = AppServices {
        jobs: JobService::new(store, job_registry, tx),
        environment,
        worker_stats: worker.stats(),
        registry,
    };

    tracing::info!(
        jobs_dir = %settings.jobs_dir.display(),
        retention_hours = settings.job_expiry.num_hours(),
        server = settings.environment.server.as_str(),
        "job services ready"
    );

    Ok((services, worker))
}
