//! Stats kept in one shared JSON document:
//! `{ "metadata_version": 1, "stories": { filename: { views, ratings } } }`.
//!
//! Every mutation rewrites the whole document (temp file + rename) while
//! holding an exclusive advisory lock on a sibling `.lock` file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::{MetadataError, MetadataStore, StoryStats};

const METADATA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default = "current_version")]
    metadata_version: u32,
    #[serde(default)]
    stories: BTreeMap<String, StoryStats>,
}

fn current_version() -> u32 {
    METADATA_VERSION
}

pub struct JsonFileMetadataStore {
    path: PathBuf,
    lock_path: PathBuf,
    local: Mutex<()>,
}

impl JsonFileMetadataStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        Self {
            lock_path: path.with_file_name(lock_name),
            path,
            local: Mutex::new(()),
        }
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Runs `f` with the cross-process lock held.
    fn locked<T>(
        &self,
        f: impl FnOnce() -> Result<T, MetadataError>,
    ) -> Result<T, MetadataError> {
        let _guard = self
            .local
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| self.io_error(&self.lock_path, e))?;
        lock.lock_exclusive()
            .map_err(|e| self.io_error(&self.lock_path, e))?;

        let result = f();
        if let Err(e) = FileExt::unlock(&lock) {
            log::warn!("Failed to release metadata lock: {}", e);
        }
        result
    }

    /// A missing document is empty; a corrupt one is logged and treated as
    /// empty, and is overwritten on the next mutation.
    fn read_document(&self) -> Result<Document, MetadataError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };
        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                log::error!(
                    "Corrupt story metadata in {}, starting fresh: {}",
                    crate::sanitize::redact_path(&self.path),
                    e
                );
                Ok(Document::default())
            }
        }
    }

    fn write_document(&self, doc: &Document) -> Result<(), MetadataError> {
        let json = serde_json::to_vec_pretty(doc)?;
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let mut file = File::create(&tmp).map_err(|e| self.io_error(&tmp, e))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| self.io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(&self.path, e))
    }
}

impl MetadataStore for JsonFileMetadataStore {
    fn get(&self, filename: &str) -> Result<StoryStats, MetadataError> {
        self.locked(|| {
            Ok(self
                .read_document()?
                .stories
                .get(filename)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn update(
        &self,
        filename: &str,
        change: &mut dyn FnMut(&mut StoryStats),
    ) -> Result<StoryStats, MetadataError> {
        self.locked(|| {
            let mut doc = self.read_document()?;
            doc.metadata_version = METADATA_VERSION;
            let stats = doc.stories.entry(filename.to_string()).or_default();
            change(stats);
            let stats = stats.clone();
            self.write_document(&doc)?;
            Ok(stats)
        })
    }
}
