//! Background job system: persist, queue, execute, poll.
//!
//! ## Design
//!
//! - Every job is persisted before it is queued
//! - One worker thread drains the queue in FIFO order
//! - Every execution ends in a persisted `Completed` or `Failed` snapshot
//! - Finished jobs expire after the retention window
//!
//! ## Components
//!
//! - `JobStore`: snapshot persistence (file-backed or in-memory)
//! - `job_queue`: many producers, exactly one consumer
//! - `JobWorker`: runs jobs one at a time through the `Dispatcher`
//! - `JobRegistry`: outstanding ids, lookup, and expiry sweep
//! - `JobService`: submit/poll facade used by the HTTP layer

pub mod dispatch;
pub mod queue;
pub mod registry;
pub mod service;
pub mod store;
pub mod worker;

pub use dispatch::{Dispatcher, Operation, OperationContext, ScratchDir};
pub use queue::{job_queue, EnqueueError, JobReceiver, JobSender};
pub use registry::{JobHandle, JobRegistry, RegistryError};
pub use service::{JobService, SubmitError};
pub use store::{FileJobStore, InMemoryJobStore, JobStore, JobStoreError};
pub use worker::{JobWorker, WorkerError, WorkerHandle, WorkerStats, WorkerStatsHandle};
