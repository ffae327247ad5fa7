//! The job worker: one thread, one job at a time.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn};

use uploader_core::{Job, JobSnapshot, JobStateError, JobStatus, OperationError};

use super::dispatch::{Dispatcher, ScratchDir};
use super::queue::JobReceiver;
use super::store::JobStore;
use crate::config::Environment;

const SAVE_BACKOFF_INITIAL: Duration = Duration::from_millis(100);
const SAVE_BACKOFF_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("job state violation: {0}")]
    State(#[from] JobStateError),
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Jobs rejected before they ran (not in Queued).
    pub jobs_errored: u64,
    pub running: bool,
    pub uptime_secs: u64,
}

/// Shared read access to a worker's statistics.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatsHandle(Arc<Mutex<WorkerStats>>);

impl WorkerStatsHandle {
    pub fn snapshot(&self) -> WorkerStats {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut WorkerStats)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    join: Option<thread::JoinHandle<()>>,
    stats: WorkerStatsHandle,
}

impl WorkerHandle {
    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    /// Wait for the worker to stop. It stops once every `JobSender` is
    /// dropped and the queue is drained.
    pub fn join(mut self) -> WorkerStats {
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                error!("job worker thread panicked");
            }
        }
        self.stats.snapshot()
    }
}

/// Sequential job executor.
///
/// Pulls a job, marks it running, dispatches it, records the outcome, and only
/// then pulls the next one.
pub struct JobWorker<S: JobStore> {
    store: S,
    dispatcher: Dispatcher,
    environment: Arc<Environment>,
    save_backoff: (Duration, Duration),
}

impl<S: JobStore + 'static> JobWorker<S> {
    pub fn new(store: S, dispatcher: Dispatcher, environment: Arc<Environment>) -> Self {
        Self {
            store,
            dispatcher,
            environment,
            save_backoff: (SAVE_BACKOFF_INITIAL, SAVE_BACKOFF_MAX),
        }
    }

    /// Delay before the first terminal-save retry, doubling up to `max`.
    pub fn with_save_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.save_backoff = (initial, max.max(initial));
        self
    }

    /// Spawn the worker on a dedicated thread consuming `queue`.
    pub fn spawn(self, queue: JobReceiver) -> io::Result<WorkerHandle> {
        let stats = WorkerStatsHandle::default();
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name("job-worker".to_string())
            .spawn(move || self.run(&queue, &stats_clone))?;

        Ok(WorkerHandle {
            join: Some(join),
            stats,
        })
    }

    /// Consume `queue` until it closes.
    pub fn run(&self, queue: &JobReceiver, stats: &WorkerStatsHandle) {
        info!("job worker started");
        let start_time = Instant::now();

        while let Some(job) = queue.dequeue() {
            stats.update(|s| s.running = true);
            let id = job.id();
            let result = self.process(job);

            stats.update(|s| {
                s.running = false;
                s.jobs_processed += 1;
                s.uptime_secs = start_time.elapsed().as_secs();
                match &result {
                    Ok(snapshot) if snapshot.status == JobStatus::Completed => s.jobs_completed += 1,
                    Ok(_) => s.jobs_failed += 1,
                    Err(_) => s.jobs_errored += 1,
                }
            });

            if let Err(e) = result {
                error!(job_id = %id, error = %e, "job could not be processed");
            }
        }

        info!("job worker stopped");
    }

    /// Drive one job from Queued to a persisted terminal state.
    pub fn process(&self, mut job: Job) -> Result<JobSnapshot, WorkerError> {
        let span = info_span!("job", job_id = %job.id(), kind = %job.kind());
        let _enter = span.enter();

        job.start()?;
        // A lost Running snapshot is survivable: the terminal save overwrites it.
        if let Err(e) = self.store.save(&job) {
            error!(error = %e, "failed to persist running state");
        }
        info!("starting job");

        let outcome = match ScratchDir::create(&self.environment.scratch_root, job.id()) {
            Ok(scratch) => self
                .dispatcher
                .dispatch(&job, &self.environment, scratch.path()),
            Err(e) => {
                error!(error = %e, "failed to create scratch dir");
                OperationError::unexpected("ScratchDir", e.to_string()).into()
            }
        };

        job.finish(outcome)?;
        self.persist_terminal(&job);
        info!(status = %job.status(), "job done");

        Ok(job.snapshot())
    }

    /// Save the terminal snapshot, retrying until the store accepts it.
    ///
    /// The next job is not dequeued before this returns, so a poller never
    /// sees a job stuck in Running while later jobs complete.
    fn persist_terminal(&self, job: &Job) {
        let (mut delay, max) = self.save_backoff;
        let mut attempt: u32 = 1;
        loop {
            match self.store.save(job) {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, "terminal state persisted after retry");
                    }
                    return;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "failed to persist terminal state"
                    );
                    thread::sleep(delay);
                    delay = (delay * 2).min(max);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
