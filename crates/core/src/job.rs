//! Job record and lifecycle state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! Queued ──start──► Running ──finish──► Completed
//!                           └─────────► Failed
//! ```
//!
//! Completed and Failed are terminal. Every other progression is rejected with
//! [`JobStateError::InvalidProgression`] and leaves the record untouched.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{JobStateError, JobStateResult};
use crate::id::JobId;
use crate::outcome::JobOutcome;
use crate::token::AccessToken;

/// Which external operation a job performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Create a study (with its sample file) in the registry.
    Study,
    /// Attach a signal dataset to an existing study.
    Signal,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Study => "study",
            JobKind::Signal => "signal",
        }
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in the queue
    Queued,
    /// Being executed by the worker
    Running,
    /// Operation succeeded
    Completed,
    /// Operation failed (or faulted)
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_progress_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two statuses a job can finish in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Completed,
    Failed,
}

impl From<TerminalStatus> for JobStatus {
    fn from(value: TerminalStatus) -> Self {
        match value {
            TerminalStatus::Completed => JobStatus::Completed,
            TerminalStatus::Failed => JobStatus::Failed,
        }
    }
}

/// Externally visible shape of a job, as persisted and as returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(rename = "startTime", default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endTime", default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check the presence rules for timestamps and output against the status.
    pub fn is_consistent(&self) -> bool {
        let started = self.status != JobStatus::Queued;
        let finished = self.status.is_terminal();

        self.started_at.is_some() == started
            && self.ended_at.is_some() == finished
            && self.output.is_some() == finished
    }

    /// A terminal snapshot whose end is strictly older than `retention` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match (self.is_terminal(), self.ended_at) {
            (true, Some(ended_at)) => now - ended_at > retention,
            _ => false,
        }
    }
}

/// One unit of asynchronous upload work.
///
/// The record is owned by whichever component is transitioning it: the
/// producer at creation, the worker during execution. Everyone else reads the
/// persisted [`JobSnapshot`].
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    kind: JobKind,
    token: AccessToken,
    payload: JsonValue,
    context_id: Option<String>,
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    output: Option<JsonValue>,
}

impl Job {
    /// Create a queued job with a fresh id.
    pub fn new(
        kind: JobKind,
        token: AccessToken,
        payload: JsonValue,
        context_id: Option<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            kind,
            token,
            payload,
            context_id,
            status: JobStatus::Queued,
            started_at: None,
            ended_at: None,
            output: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`, stamping the matching timestamp.
    ///
    /// `output` is recorded on terminal transitions only; a missing or null
    /// output is stored as an empty object so the record keeps its shape.
    pub fn transition(&mut self, next: JobStatus, output: Option<JsonValue>) -> JobStateResult<()> {
        if !self.status.can_progress_to(next) {
            return Err(JobStateError::InvalidProgression {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => {
                self.ended_at = Some(now);
                self.output = Some(match output {
                    None | Some(JsonValue::Null) => JsonValue::Object(Map::new()),
                    Some(value) => value,
                });
            }
            JobStatus::Queued => {}
        }
        self.status = next;
        Ok(())
    }

    /// Queued → Running.
    pub fn start(&mut self) -> JobStateResult<()> {
        if self.status != JobStatus::Queued {
            return Err(JobStateError::AlreadyStarted(self.status));
        }
        self.transition(JobStatus::Running, None)
    }

    /// Running → Completed/Failed with the outcome's output.
    pub fn finish(&mut self, outcome: JobOutcome) -> JobStateResult<()> {
        let (status, output) = outcome.into_parts();
        self.transition(status.into(), Some(output))
    }

    pub fn started_at(&self) -> JobStateResult<DateTime<Utc>> {
        self.started_at.ok_or(JobStateError::NotStarted)
    }

    pub fn ended_at(&self) -> JobStateResult<DateTime<Utc>> {
        self.ended_at.ok_or(JobStateError::NotFinished)
    }

    pub fn output(&self) -> JobStateResult<&JsonValue> {
        if !self.status.is_terminal() {
            return Err(JobStateError::NotFinished);
        }
        self.output.as_ref().ok_or(JobStateError::NotFinished)
    }

    /// The externally visible shape of this record.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            output: self.output.clone(),
        }
    }
}
