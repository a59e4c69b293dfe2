use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;
use walkdir::WalkDir;

use crate::error::QueueError;

/// A job file waiting in `queue/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// File stem; normally the job's UUID.
    pub request_id: String,
    pub path: PathBuf,
    /// Creation time, or modification time where the platform has none.
    pub created: SystemTime,
}

/// Picks the next job from a scan.
pub type Selector = fn(&[QueueEntry]) -> Option<&QueueEntry>;

/// Default selection: the earliest file first, ties broken by id so the
/// order is stable.
pub fn oldest_first(entries: &[QueueEntry]) -> Option<&QueueEntry> {
    entries
        .iter()
        .min_by(|a, b| a.created.cmp(&b.created).then_with(|| a.request_id.cmp(&b.request_id)))
}

pub struct QueueScanner {
    queue_directory: PathBuf,
}

impl QueueScanner {
    pub fn new<P: AsRef<Path>>(queue_directory: P) -> Self {
        Self {
            queue_directory: queue_directory.as_ref().to_path_buf(),
        }
    }

    pub fn queue_directory(&self) -> &Path {
        &self.queue_directory
    }

    /// Lists `*.json` files at the top level of the queue. Staging files
    /// (dot-prefixed) and subdirectories are ignored.
    pub fn scan(&self) -> Result<Vec<QueueEntry>, QueueError> {
        if !self.queue_directory.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.queue_directory)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = entry.map_err(|e| QueueError::ScanFailed {
                path: self.queue_directory.clone(),
                source: e,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.is_empty() || stem.starts_with('.') {
                continue;
            }

            // the file may be finalized between listing and stat
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            entries.push(QueueEntry {
                request_id: stem.to_string(),
                path: path.to_path_buf(),
                created,
            });
        }

        debug!(
            "Scanned {} queued jobs in {}",
            entries.len(),
            self.queue_directory.display()
        );
        Ok(entries)
    }
}
