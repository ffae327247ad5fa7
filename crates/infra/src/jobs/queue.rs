//! Single-consumer job queue.
//!
//! Producers hold cloneable [`JobSender`]s; exactly one [`JobReceiver`]
//! exists, so at most one job executes at a time.

use std::sync::mpsc;

use uploader_core::{Job, JobId};

/// Create a linked producer/consumer pair.
pub fn job_queue() -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel();
    (JobSender { tx }, JobReceiver { rx })
}

/// The consumer went away; the job was not queued.
#[derive(Debug, thiserror::Error)]
#[error("job queue closed; job {0} was not enqueued")]
pub struct EnqueueError(pub JobId);

/// Producer side. Unbounded; `enqueue` never blocks.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Job>,
}

impl JobSender {
    pub fn enqueue(&self, job: Job) -> Result<(), EnqueueError> {
        self.tx
            .send(job)
            .map_err(|mpsc::SendError(job)| EnqueueError(job.id()))
    }
}

/// Consumer side. Not `Clone`.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<Job>,
}

impl JobReceiver {
    /// Block until a job is available.
    ///
    /// Returns `None` once every sender has been dropped and the queue is
    /// drained.
    pub fn dequeue(&self) -> Option<Job> {
        self.rx.recv().ok()
    }
}
