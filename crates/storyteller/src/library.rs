//! Reading side: browsing, viewing and rating rendered stories.
//!
//! The stories directory is the source of truth for what exists. Processed
//! job records and `user_stories` rows only enrich what is found there.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::db::{story_repo, user_repo, Database, DatabaseError};
use crate::error::QueueError;
use crate::job::{JobRecord, JobState, JobStore};
use crate::metadata::{MetadataError, MetadataStore, StoryStats};
use crate::render::{extract_metadata, title_from_filename, ArtifactMetadata};
use crate::submission::language_name;

/// Owner assigned to ownerless records when syncing with `force`.
pub const FALLBACK_OWNER_ID: i64 = 1;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Invalid story filename '{0}'")]
    InvalidFilename(String),

    #[error("Story '{0}' not found")]
    NotFound(String),

    #[error("Story '{0}' is private")]
    Private(String),

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("Failed to read story '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory scan failed for '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryView {
    pub filename: String,
    pub html: String,
    pub metadata: ArtifactMetadata,
    /// The processed job record, when the page's id still resolves to one.
    #[serde(skip)]
    pub record: Option<JobRecord>,
    pub owner_id: Option<i64>,
    pub language: Option<&'static str>,
    pub views: u64,
    pub average_rating: f64,
    pub rating_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryListing {
    pub filename: String,
    pub title: String,
    pub created: DateTime<Local>,
    pub request_id: Option<String>,
    pub theme: Option<String>,
    pub age_range: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub processing_time: Option<f64>,
    /// Narration size in MiB, rounded to two decimals.
    pub audio_size_mb: Option<f64>,
    pub language: Option<&'static str>,
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub views: u64,
    pub average_rating: f64,
    pub rating_count: usize,
}

impl StoryListing {
    pub fn has_audio(&self) -> bool {
        self.audio_size_mb.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: usize,
}

impl From<&StoryStats> for RatingSummary {
    fn from(stats: &StoryStats) -> Self {
        Self {
            average: stats.average_rating(),
            count: stats.rating_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Who owns a story and what it says about its own visibility.
struct Ownership {
    owner: Option<i64>,
    story_private: Option<bool>,
}

pub struct StoryLibrary {
    stories_dir: PathBuf,
    jobs: JobStore,
    db: Database,
    metadata: Arc<dyn MetadataStore>,
}

impl StoryLibrary {
    pub fn new(
        stories_dir: impl Into<PathBuf>,
        jobs: JobStore,
        db: Database,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            stories_dir: stories_dir.into(),
            jobs,
            db,
            metadata,
        }
    }

    pub fn stories_dir(&self) -> &Path {
        &self.stories_dir
    }

    /// Reads a story page for `viewer` and counts the view.
    pub fn view(&self, filename: &str, viewer: Option<i64>) -> Result<StoryView, LibraryError> {
        let path = self.artifact_path(filename)?;
        let html = std::fs::read_to_string(&path).map_err(|e| LibraryError::Read {
            path: path.clone(),
            source: e,
        })?;

        let metadata = extract_metadata(&html);
        let record = metadata
            .request_id
            .as_deref()
            .and_then(|id| self.processed_record(id));
        let ownership = self.ownership(filename, record.as_ref())?;

        if !self.is_visible(&ownership, viewer)? {
            debug!("Viewer {:?} denied private story {}", viewer, filename);
            return Err(LibraryError::Private(filename.to_string()));
        }

        let stats = self
            .metadata
            .update(filename, &mut |s: &mut StoryStats| s.views += 1)?;
        let language = record
            .as_ref()
            .map(|r| language_name(&r.parameters.language));

        Ok(StoryView {
            filename: filename.to_string(),
            html,
            metadata,
            owner_id: ownership.owner,
            language,
            views: stats.views,
            average_rating: stats.average_rating(),
            rating_count: stats.rating_count(),
            record,
        })
    }

    /// Every story `viewer` may see, newest first.
    pub fn list(&self, viewer: Option<i64>) -> Result<Vec<StoryListing>, LibraryError> {
        if !self.stories_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut listings = Vec::new();
        for entry in WalkDir::new(&self.stories_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| LibraryError::Scan {
                path: self.stories_dir.clone(),
                source: e,
            })?;
            let Some(filename) = entry.file_name().to_str() else {
                continue;
            };
            if !entry.file_type().is_file() || !filename.ends_with(".html") {
                continue;
            }

            match self.listing(entry.path(), filename, viewer) {
                Ok(Some(listing)) => listings.push(listing),
                Ok(None) => {}
                Err(e) => warn!("Skipping story {}: {}", filename, e),
            }
        }

        listings.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(listings)
    }

    fn listing(
        &self,
        path: &Path,
        filename: &str,
        viewer: Option<i64>,
    ) -> Result<Option<StoryListing>, LibraryError> {
        let html = std::fs::read_to_string(path).map_err(|e| LibraryError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let request_id = extract_metadata(&html).request_id;
        let record = request_id
            .as_deref()
            .and_then(|id| self.processed_record(id));

        let ownership = self.ownership(filename, record.as_ref())?;
        if !self.is_visible(&ownership, viewer)? {
            return Ok(None);
        }

        let stats = self.metadata.get(filename)?;
        let created = std::fs::metadata(path)
            .and_then(|m| m.created().or_else(|_| m.modified()))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let params = record.as_ref().map(|r| &r.parameters);
        let ai_info = record.as_ref().and_then(|r| r.ai_info.as_ref());
        let audio_size_mb = record
            .as_ref()
            .and_then(|r| r.audio_file.as_deref())
            .and_then(|audio| std::fs::metadata(self.stories_dir.join(audio)).ok())
            .map(|m| (m.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0);

        Ok(Some(StoryListing {
            filename: filename.to_string(),
            title: title_from_filename(filename),
            created: DateTime::<Local>::from(created),
            request_id,
            theme: params.map(|p| p.theme.clone()),
            age_range: params.map(|p| p.age_range.clone()),
            provider: ai_info.map(|i| i.provider.clone()),
            model: ai_info.map(|i| i.model.clone()),
            processing_time: record
                .as_ref()
                .and_then(|r| r.timing.as_ref())
                .map(|t| t.total_processing_seconds),
            audio_size_mb,
            language: params.map(|p| language_name(&p.language)),
            username: record.as_ref().and_then(|r| r.username.clone()),
            user_id: ownership.owner,
            views: stats.views,
            average_rating: stats.average_rating(),
            rating_count: stats.rating_count(),
        }))
    }

    pub fn rate(&self, filename: &str, rating: i64) -> Result<RatingSummary, LibraryError> {
        let value = u8::try_from(rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or(LibraryError::InvalidRating(rating))?;
        self.artifact_path(filename)?;

        let stats = self
            .metadata
            .update(filename, &mut |s: &mut StoryStats| s.ratings.push(value))?;
        info!(
            "Rated {} with {} (average {:.2} over {})",
            filename,
            value,
            stats.average_rating(),
            stats.rating_count()
        );
        Ok(RatingSummary::from(&stats))
    }

    /// Loads `user_stories` from processed job records in `dir`.
    ///
    /// Records without a user are skipped, or with `force` attributed to
    /// [`FALLBACK_OWNER_ID`]. Each file succeeds or fails on its own.
    pub fn sync_processed(&self, dir: &Path, force: bool) -> Result<SyncReport, LibraryError> {
        let mut report = SyncReport::default();
        if !dir.is_dir() {
            warn!("Processed directory {} does not exist", dir.display());
            return Ok(report);
        }

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| LibraryError::Scan {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            match self.sync_one(path, force) {
                Ok(id) => {
                    debug!("Synced {} into story row {}", path.display(), id);
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!("Could not sync {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Synced processed records: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        Ok(report)
    }

    fn sync_one(&self, path: &Path, force: bool) -> Result<i64, LibraryError> {
        let record = self.jobs.read(path)?;
        let owner = match record.user_id {
            Some(id) => Some(id),
            None if force => {
                warn!(
                    "No user on {}, assigning user {}",
                    record.request_id, FALLBACK_OWNER_ID
                );
                Some(FALLBACK_OWNER_ID)
            }
            None => None,
        };
        let Some(owner) = owner else {
            return Err(DatabaseError::Invalid {
                entity: "story",
                reason: format!("job {} has no user", record.request_id),
            }
            .into());
        };
        Ok(story_repo::upsert_from_record(&self.db, &record, Some(owner))?)
    }

    /// Resolves a user-supplied filename to a page directly inside the
    /// stories directory. A story row whose page is gone is dropped on the way.
    fn artifact_path(&self, filename: &str) -> Result<PathBuf, LibraryError> {
        if filename.is_empty() || filename.contains("..") || filename.contains(['/', '\\']) {
            return Err(LibraryError::InvalidFilename(filename.to_string()));
        }
        let path = self.stories_dir.join(filename);
        if path.is_file() {
            return Ok(path);
        }

        if let Some(row) = story_repo::find_by_filename(&self.db, filename)? {
            warn!("Removing story row {} for missing page {}", row.id, filename);
            story_repo::delete(&self.db, row.id)?;
        }
        Err(LibraryError::NotFound(filename.to_string()))
    }

    fn processed_record(&self, request_id: &str) -> Option<JobRecord> {
        let path = self.jobs.path_for(JobState::Processed, request_id);
        if !path.is_file() {
            return None;
        }
        match self.jobs.read(&path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Error loading processed record {}: {}", request_id, e);
                None
            }
        }
    }

    fn ownership(
        &self,
        filename: &str,
        record: Option<&JobRecord>,
    ) -> Result<Ownership, LibraryError> {
        let row = story_repo::find_by_filename(&self.db, filename)?;
        Ok(Ownership {
            owner: record
                .and_then(|r| r.user_id)
                .or(row.as_ref().map(|r| r.user_id)),
            story_private: row
                .as_ref()
                .and_then(|r| r.is_private)
                .or(record.and_then(|r| r.parameters.is_private)),
        })
    }

    /// Owners always see their stories. Otherwise a story-level flag wins
    /// when one is set, and the owner's account default applies when not.
    fn is_visible(&self, ownership: &Ownership, viewer: Option<i64>) -> Result<bool, LibraryError> {
        let Some(owner) = ownership.owner else {
            return Ok(true);
        };
        if viewer == Some(owner) {
            return Ok(true);
        }
        if let Some(private) = ownership.story_private {
            return Ok(!private);
        }
        Ok(!user_repo::is_private(&self.db, owner)?)
    }
}
