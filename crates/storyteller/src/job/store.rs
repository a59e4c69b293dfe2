//! Three-directory storage for job state.
//!
//! `queue/`, `processed/` and `error/` each hold `{request_id}.json` files and
//! the directory a file lives in is the job's state. Transitions go one way,
//! out of `queue`, and never back.
//!
//! There is no lease: a worker that dies between reading a queue file and
//! finalizing it leaves the job in `queue` to be picked up again on restart.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::config::PathsConfig;
use crate::error::{QueueError, StorageError};

use super::record::{annotate_failure, JobFailure, JobRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Queued,
    Processed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 3] = [JobState::Queued, JobState::Processed, JobState::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processed => "processed",
            JobState::Failed => "error",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Job ids become file names. Submitted ids are UUIDs, but files dropped
/// into `queue` by hand keep their stem as id, so any single path component
/// that is not hidden is accepted.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
}

#[derive(Debug, Clone)]
pub struct JobStore {
    queue: PathBuf,
    processed: PathBuf,
    error: PathBuf,
}

impl JobStore {
    pub fn new<P: AsRef<Path>>(queue: P, processed: P, error: P) -> Self {
        Self {
            queue: queue.as_ref().to_path_buf(),
            processed: processed.as_ref().to_path_buf(),
            error: error.as_ref().to_path_buf(),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(&paths.queue, &paths.processed, &paths.error)
    }

    pub fn dir(&self, state: JobState) -> &Path {
        match state {
            JobState::Queued => &self.queue,
            JobState::Processed => &self.processed,
            JobState::Failed => &self.error,
        }
    }

    pub fn path_for(&self, state: JobState, id: &str) -> PathBuf {
        self.dir(state).join(format!("{}.json", id))
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        for state in JobState::ALL {
            let dir = self.dir(state);
            std::fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Writes a new record into `queue`. The file appears complete or not at all.
    pub fn enqueue(&self, record: &JobRecord) -> Result<PathBuf, QueueError> {
        let id = record.id();
        if let Some((state, path)) = self.locate(&id) {
            debug!("Refusing to enqueue {}: already {}", id, state);
            return Err(QueueError::Duplicate(id, path));
        }

        self.ensure_dirs()?;
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| QueueError::Serialize {
            request_id: id.clone(),
            source: e,
        })?;

        let target = self.path_for(JobState::Queued, &id);
        let temp = write_temp(&self.queue, &id, &bytes)?;
        rename(&temp, &target)?;
        Ok(target)
    }

    /// Finds the job by checking queue, processed and error in that order.
    ///
    /// Plain existence checks with no lock: a lookup that runs while the worker
    /// is between removing the queue file and renaming the result sees nothing.
    pub fn locate(&self, id: &str) -> Option<(JobState, PathBuf)> {
        if !is_valid_job_id(id) {
            return None;
        }
        JobState::ALL.into_iter().find_map(|state| {
            let path = self.path_for(state, id);
            path.is_file().then_some((state, path))
        })
    }

    pub fn read(&self, path: &Path) -> Result<JobRecord, QueueError> {
        let bytes = read_file(path)?;
        serde_json::from_slice(&bytes).map_err(|e| QueueError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reads a job file as untyped JSON. Files that are not JSON at all come
    /// back as a string holding their raw text.
    pub fn read_raw(&self, path: &Path) -> Result<serde_json::Value, QueueError> {
        let bytes = read_file(path)?;
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into())))
    }

    /// Moves a finished record from `queue` to `processed`.
    pub fn complete(&self, record: &JobRecord) -> Result<PathBuf, QueueError> {
        let id = record.id();
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| QueueError::Serialize {
            request_id: id.clone(),
            source: e,
        })?;
        self.finalize(JobState::Processed, &id, &bytes)
    }

    /// Moves a job from `queue` to `error`, appending the failure to whatever
    /// was in the queue file.
    pub fn fail(
        &self,
        id: &str,
        original: serde_json::Value,
        failure: &JobFailure,
    ) -> Result<PathBuf, QueueError> {
        let doc = annotate_failure(original, failure, Local::now().naive_local());
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| QueueError::Serialize {
            request_id: id.to_string(),
            source: e,
        })?;
        self.finalize(JobState::Failed, id, &bytes)
    }

    /// Staged write, then queue removal, then publish.
    ///
    /// A crash before the queue file is removed leaves the job queued and the
    /// staged file orphaned. Between removal and rename the job is in no
    /// directory at all.
    fn finalize(&self, state: JobState, id: &str, bytes: &[u8]) -> Result<PathBuf, QueueError> {
        if !is_valid_job_id(id) {
            return Err(QueueError::InvalidId(id.to_string()));
        }

        let dir = self.dir(state);
        std::fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let temp = write_temp(dir, id, bytes)?;

        let queued = self.path_for(JobState::Queued, id);
        match std::fs::remove_file(&queued) {
            Ok(()) => {}
            // deleted out of band while the job ran
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Queue file for {} vanished before it was finalized", id);
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp);
                return Err(StorageError::RemoveFile {
                    path: queued,
                    source: e,
                }
                .into());
            }
        }

        let target = self.path_for(state, id);
        rename(&temp, &target)?;
        debug!("Job {} moved to {}", id, state);
        Ok(target)
    }

    /// All `*.json` files directly inside the state's directory.
    pub fn list(&self, state: JobState) -> Result<Vec<PathBuf>, QueueError> {
        let dir = self.dir(state);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| QueueError::ScanFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("json")
                && !is_hidden(path)
            {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    pub fn counts(&self) -> Result<QueueCounts, QueueError> {
        Ok(QueueCounts {
            queued: self.list(JobState::Queued)?.len(),
            processed: self.list(JobState::Processed)?.len(),
            failed: self.list(JobState::Failed)?.len(),
        })
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    std::fs::read(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Writes `bytes` to a hidden staging file next to its final location.
fn write_temp(dir: &Path, id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    let temp = dir.join(format!(".{}.json.tmp", id));
    std::fs::write(&temp, bytes).map_err(|e| StorageError::WriteFile {
        path: temp.clone(),
        source: e,
    })?;
    Ok(temp)
}

fn rename(from: &Path, to: &Path) -> Result<(), StorageError> {
    std::fs::rename(from, to).map_err(|e| StorageError::MoveFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })
}
