//! Job snapshot storage implementations.
//!
//! The store is the only channel through which one process observes another's
//! progress: the worker writes, pollers read. Every write is a full snapshot.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use uploader_core::{Job, JobId, JobSnapshot};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Persist the full current state of `job`, replacing any previous snapshot.
    fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        self.save_snapshot(job.id(), &job.snapshot())
    }

    /// Persist a snapshot under `id`.
    fn save_snapshot(&self, id: JobId, snapshot: &JobSnapshot) -> Result<(), JobStoreError>;

    /// Read back the last persisted snapshot.
    fn load(&self, id: JobId) -> Result<JobSnapshot, JobStoreError>;

    /// Remove the snapshot. Deleting an absent id is not an error.
    fn delete(&self, id: JobId) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: JobId, reason: String },
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

impl JobStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JobStoreError::NotFound(_))
    }
}

fn check_consistent(id: JobId, snapshot: JobSnapshot) -> Result<JobSnapshot, JobStoreError> {
    if snapshot.is_consistent() {
        Ok(snapshot)
    } else {
        Err(JobStoreError::Corrupt {
            id,
            reason: format!("timestamps/output do not match status {}", snapshot.status),
        })
    }
}

/// File-backed store: one JSON file per job, named by id.
///
/// Writes go to a hidden temporary sibling and are renamed into place, so a
/// concurrent reader sees either the old snapshot or the new one.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: JobId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    fn tmp_path_for(&self, id: JobId) -> PathBuf {
        self.dir.join(format!(".{id}.tmp"))
    }
}

impl JobStore for FileJobStore {
    fn save_snapshot(&self, id: JobId, snapshot: &JobSnapshot) -> Result<(), JobStoreError> {
        let bytes = serde_json::to_vec(snapshot).map_err(|e| JobStoreError::Corrupt {
            id,
            reason: e.to_string(),
        })?;

        // The directory may have been removed underneath us.
        fs::create_dir_all(&self.dir)?;

        let tmp = self.tmp_path_for(id);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.path_for(id))?;
        Ok(())
    }

    fn load(&self, id: JobId) -> Result<JobSnapshot, JobStoreError> {
        let bytes = match fs::read(self.path_for(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(JobStoreError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        let snapshot: JobSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| JobStoreError::Corrupt {
                id,
                reason: e.to_string(),
            })?;
        check_consistent(id, snapshot)
    }

    fn delete(&self, id: JobId) -> Result<(), JobStoreError> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    snapshots: RwLock<HashMap<JobId, JobSnapshot>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn save_snapshot(&self, id: JobId, snapshot: &JobSnapshot) -> Result<(), JobStoreError> {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, snapshot.clone());
        Ok(())
    }

    fn load(&self, id: JobId) -> Result<JobSnapshot, JobStoreError> {
        let snapshot = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(JobStoreError::NotFound(id))?;
        check_consistent(id, snapshot)
    }

    fn delete(&self, id: JobId) -> Result<(), JobStoreError> {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }
}

impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).save(job)
    }

    fn save_snapshot(&self, id: JobId, snapshot: &JobSnapshot) -> Result<(), JobStoreError> {
        (**self).save_snapshot(id, snapshot)
    }

    fn load(&self, id: JobId) -> Result<JobSnapshot, JobStoreError> {
        (**self).load(id)
    }

    fn delete(&self, id: JobId) -> Result<(), JobStoreError> {
        (**self).delete(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uploader_core::{AccessToken, JobKind, JobOutcome, JobStatus};

    use super::*;

    fn test_job() -> Job {
        Job::new(
            JobKind::Study,
            AccessToken::new("token"),
            json!({"Study Source": "lab"}),
            None,
        )
    }

    fn finished_job() -> Job {
        let mut job = test_job();
        job.start().unwrap();
        job.finish(JobOutcome::study_created("ST123")).unwrap();
        job
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        let mut job = test_job();

        store.save(&job).unwrap();
        assert_eq!(store.load(job.id()).unwrap().status, JobStatus::Queued);

        job.start().unwrap();
        store.save(&job).unwrap();
        let loaded = store.load(job.id()).unwrap();
        assert_eq!(loaded, job.snapshot());
    }

    #[test]
    fn snapshot_file_has_wire_shape_and_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        let job = finished_job();
        store.save(&job).unwrap();

        let raw = fs::read_to_string(dir.path().join(job.id().to_string())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["output"], json!({"studyAccession": "ST123"}));
        assert!(value.get("startTime").is_some());
        assert!(value.get("endTime").is_some());
        assert!(!raw.contains("token"));
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        let job = finished_job();
        store.save(&job).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![job.id().to_string()]);
    }

    #[test]
    fn loading_a_terminal_job_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        let job = finished_job();
        store.save(&job).unwrap();

        let first = serde_json::to_vec(&store.load(job.id()).unwrap()).unwrap();
        let second = serde_json::to_vec(&store.load(job.id()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_and_deleted_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();

        assert!(store.load(JobId::new()).unwrap_err().is_not_found());

        let job = finished_job();
        store.save(&job).unwrap();
        store.delete(job.id()).unwrap();
        assert!(store.load(job.id()).unwrap_err().is_not_found());

        // Deleting twice is fine.
        store.delete(job.id()).unwrap();
    }

    #[test]
    fn garbage_on_disk_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        let id = JobId::new();

        fs::write(dir.path().join(id.to_string()), b"{not json").unwrap();
        assert!(matches!(store.load(id), Err(JobStoreError::Corrupt { .. })));

        // Valid JSON, but a completed job without an end time.
        fs::write(
            dir.path().join(id.to_string()),
            br#"{"status":"COMPLETED","startTime":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(store.load(id), Err(JobStoreError::Corrupt { .. })));
    }

    #[test]
    fn in_memory_store_behaves_like_the_file_store() {
        let store = InMemoryJobStore::new();
        let job = finished_job();

        store.save(&job).unwrap();
        assert_eq!(store.load(job.id()).unwrap(), job.snapshot());
        assert_eq!(store.len(), 1);

        store.delete(job.id()).unwrap();
        assert!(store.load(job.id()).unwrap_err().is_not_found());
        assert!(store.is_empty());
    }
}
