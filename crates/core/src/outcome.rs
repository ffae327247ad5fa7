//! Terminal job outcomes and the operation failure taxonomy.
//!
//! Operations report failures as [`OperationError`]; dispatch turns every
//! error into a `Failed` [`JobOutcome`] so pollers only ever see a structured
//! output, never a crash.

use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::job::TerminalStatus;

/// Final status plus the output shown to the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    status: TerminalStatus,
    output: JsonValue,
}

impl JobOutcome {
    pub fn completed(output: JsonValue) -> Self {
        Self {
            status: TerminalStatus::Completed,
            output,
        }
    }

    pub fn failed(output: JsonValue) -> Self {
        Self {
            status: TerminalStatus::Failed,
            output,
        }
    }

    /// A study was created; hands back its new accession.
    pub fn study_created(accession: impl Into<String>) -> Self {
        Self::completed(json!({ "studyAccession": accession.into() }))
    }

    /// A signal dataset was attached to `study_accession`.
    pub fn signal_created(study_accession: impl Into<String>) -> Self {
        Self::completed(json!({
            "signal": "created",
            "studyAccession": study_accession.into(),
        }))
    }

    pub fn status(&self) -> TerminalStatus {
        self.status
    }

    pub fn output(&self) -> &JsonValue {
        &self.output
    }

    pub fn into_parts(self) -> (TerminalStatus, JsonValue) {
        (self.status, self.output)
    }
}

/// Every recognised way an upload operation can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The payload is not a JSON object.
    #[error("no valid json body")]
    InvalidBody,

    /// The registry rejected the caller's token.
    #[error("forbidden")]
    Forbidden,

    /// Object storage refused access to the bucket.
    #[error("S3 bucket permission denied")]
    StoragePermissionDenied,

    /// The caller supplied something unusable.
    #[error("bad request: {name}")]
    BadRequest { name: String, detail: Vec<String> },

    /// Something the caller referenced doesn't exist upstream.
    #[error("not found: {name}")]
    NotFound { name: String, detail: Vec<String> },

    /// Anything not covered above.
    #[error("unexpected error: {name}")]
    Unexpected { name: String, detail: Vec<String> },
}

impl OperationError {
    pub fn bad_request(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            name: name.into(),
            detail: vec![detail.into()],
        }
    }

    pub fn not_found(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            detail: vec![detail.into()],
        }
    }

    pub fn unexpected(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unexpected {
            name: name.into(),
            detail: vec![detail.into()],
        }
    }

    /// The structured output a poller sees for this failure.
    pub fn to_output(&self) -> JsonValue {
        match self {
            OperationError::InvalidBody => json!({ "error": "no valid json body" }),
            OperationError::Forbidden => json!({ "error": "forbidden" }),
            OperationError::StoragePermissionDenied => {
                json!({ "error": "S3 bucket permission denied" })
            }
            OperationError::BadRequest { name, detail } => {
                json!({ "error": "bad request", "name": name, "detail": detail })
            }
            OperationError::NotFound { name, detail } => {
                json!({ "error": "not found", "name": name, "detail": detail })
            }
            OperationError::Unexpected { name, detail } => {
                json!({ "error": "error", "name": name, "detail": detail })
            }
        }
    }
}

impl From<OperationError> for JobOutcome {
    fn from(err: OperationError) -> Self {
        JobOutcome::failed(err.to_output())
    }
}
