//! `uploader-core` - job domain building blocks.
//!
//! This crate contains the **pure** job model (no IO): identifiers, the
//! lifecycle state machine, persisted snapshots and the outcome taxonomy.

pub mod error;
pub mod id;
pub mod job;
pub mod outcome;
pub mod token;

pub use error::{InvalidJobId, JobStateError, JobStateResult};
pub use id::JobId;
pub use job::{Job, JobKind, JobSnapshot, JobStatus, TerminalStatus};
pub use outcome::{JobOutcome, OperationError};
pub use token::AccessToken;
