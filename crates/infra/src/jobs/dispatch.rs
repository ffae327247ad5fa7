//! Operation dispatch: job kind → operation, with every failure path turned
//! into a terminal outcome.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, warn};

use uploader_core::{AccessToken, Job, JobId, JobKind, JobOutcome, OperationError};

use crate::config::Environment;

/// Everything an operation may look at while running one job.
#[derive(Debug)]
pub struct OperationContext<'a> {
    pub job_id: JobId,
    pub token: &'a AccessToken,
    pub payload: &'a serde_json::Value,
    /// Secondary id, e.g. the parent study for a signal.
    pub context_id: Option<&'a str>,
    pub environment: &'a Environment,
    /// Per-job temporary directory; removed by the worker afterwards.
    pub scratch_dir: &'a Path,
}

/// An external, long-running upload routine.
///
/// Runs on the worker thread and may block. Logging goes through `tracing`;
/// the worker has already entered a span carrying the job id and kind.
pub trait Operation: Send + Sync {
    fn execute(&self, ctx: &OperationContext<'_>) -> Result<JobOutcome, OperationError>;

    /// Release anything `execute` acquired. Called after every execution,
    /// including one that panicked.
    fn cleanup(&self, _ctx: &OperationContext<'_>) {}
}

/// Fixed table of operations keyed by job kind.
#[derive(Default)]
pub struct Dispatcher {
    operations: HashMap<JobKind, Arc<dyn Operation>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the operation for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: JobKind, operation: Arc<dyn Operation>) {
        self.operations.insert(kind, operation);
    }

    pub fn with(mut self, kind: JobKind, operation: Arc<dyn Operation>) -> Self {
        self.register(kind, operation);
        self
    }

    pub fn handles(&self, kind: JobKind) -> bool {
        self.operations.contains_key(&kind)
    }

    /// Run the operation for `job`. Never panics, never errors.
    pub fn dispatch(&self, job: &Job, environment: &Environment, scratch_dir: &Path) -> JobOutcome {
        let Some(operation) = self.operations.get(&job.kind()) else {
            warn!(job_id = %job.id(), kind = %job.kind(), "no operation registered for job kind");
            return OperationError::unexpected(
                "NoOperation",
                format!("no operation registered for kind {}", job.kind()),
            )
            .into();
        };

        let ctx = OperationContext {
            job_id: job.id(),
            token: job.token(),
            payload: job.payload(),
            context_id: job.context_id(),
            environment,
            scratch_dir,
        };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| operation.execute(&ctx))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(job_id = %job.id(), error = %err, "operation failed");
                err.into()
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(job_id = %job.id(), panic = %detail, "operation panicked");
                OperationError::unexpected("Panic", detail).into()
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(|| operation.cleanup(&ctx))).is_err() {
            error!(job_id = %job.id(), "operation cleanup panicked");
        }

        outcome
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}

/// A job's scratch directory; removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(root: &Path, id: JobId) -> std::io::Result<Self> {
        let path = root.join(id.to_string());
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove scratch dir");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use uploader_core::TerminalStatus;

    use super::*;

    struct Fixed(Result<JobOutcome, OperationError>);

    impl Operation for Fixed {
        fn execute(&self, _ctx: &OperationContext<'_>) -> Result<JobOutcome, OperationError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Panicky {
        cleanups: AtomicUsize,
    }

    impl Operation for Panicky {
        fn execute(&self, ctx: &OperationContext<'_>) -> Result<JobOutcome, OperationError> {
            fs::write(ctx.scratch_dir.join("partial.tsv"), "a\tb\n").unwrap();
            panic!("upstream library blew up");
        }

        fn cleanup(&self, _ctx: &OperationContext<'_>) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_job(kind: JobKind) -> Job {
        Job::new(kind, AccessToken::new("token"), json!({}), None)
    }

    fn env(root: &Path) -> Environment {
        let mut env = Environment::for_endpoint("http://registry.invalid");
        env.scratch_root = root.to_path_buf();
        env
    }

    #[test]
    fn success_passes_through() {
        let dispatcher = Dispatcher::new().with(
            JobKind::Study,
            Arc::new(Fixed(Ok(JobOutcome::study_created("ST123")))),
        );
        let dir = tempfile::tempdir().unwrap();

        let outcome = dispatcher.dispatch(&test_job(JobKind::Study), &env(dir.path()), dir.path());
        assert_eq!(outcome, JobOutcome::study_created("ST123"));
    }

    #[test]
    fn operation_errors_become_failed_outcomes() {
        let dispatcher = Dispatcher::new().with(
            JobKind::Signal,
            Arc::new(Fixed(Err(OperationError::not_found("StudyAccessionError", "GSF1")))),
        );
        let dir = tempfile::tempdir().unwrap();

        let outcome = dispatcher.dispatch(&test_job(JobKind::Signal), &env(dir.path()), dir.path());
        assert_eq!(outcome.status(), TerminalStatus::Failed);
        assert_eq!(outcome.output()["error"], "not found");
    }

    #[test]
    fn missing_operation_is_a_failure_not_a_crash() {
        let dispatcher = Dispatcher::new();
        let dir = tempfile::tempdir().unwrap();

        let outcome = dispatcher.dispatch(&test_job(JobKind::Study), &env(dir.path()), dir.path());
        assert_eq!(outcome.status(), TerminalStatus::Failed);
        assert_eq!(outcome.output()["name"], "NoOperation");
    }

    #[test]
    fn panics_are_contained_and_cleanup_still_runs() {
        let op = Arc::new(Panicky::default());
        let dispatcher = Dispatcher::new().with(JobKind::Study, op.clone());
        let root = tempfile::tempdir().unwrap();
        let job = test_job(JobKind::Study);
        let environment = env(root.path());

        let scratch_path = {
            let scratch = ScratchDir::create(root.path(), job.id()).unwrap();
            let outcome = dispatcher.dispatch(&job, &environment, scratch.path());

            assert_eq!(outcome.status(), TerminalStatus::Failed);
            assert_eq!(
                outcome.output(),
                &json!({"error": "error", "name": "Panic", "detail": ["upstream library blew up"]})
            );
            scratch.path().to_path_buf()
        };

        assert_eq!(op.cleanups.load(Ordering::SeqCst), 1);
        assert!(!scratch_path.exists());
    }
}
