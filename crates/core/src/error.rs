//! Job state-machine error model.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type for job state-machine calls.
pub type JobStateResult<T> = Result<T, JobStateError>;

/// Contract violations on a job record.
///
/// These indicate a bug in whoever drives the record (producer or worker),
/// never a user error. Each has its own variant so callers can't confuse them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobStateError {
    /// The requested status change is not in the legal progression table.
    #[error("invalid job status progression: {from} -> {to}")]
    InvalidProgression { from: JobStatus, to: JobStatus },

    /// `start` was called on a job that is no longer queued.
    #[error("job already started (status {0})")]
    AlreadyStarted(JobStatus),

    /// A start-time read on a job that has not been started.
    #[error("job not started")]
    NotStarted,

    /// An end-time or output read on a job that has not finished.
    #[error("job not finished")]
    NotFinished,
}

/// A job identifier failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid job id: {0}")]
pub struct InvalidJobId(pub String);
