//! Per-story view counts and ratings, keyed by artifact filename.

pub mod json_file;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use json_file::JsonFileMetadataStore;
pub use sqlite::SqliteMetadataStore;

use crate::config::{Config, MetadataBackend};
use crate::db::{Database, DatabaseError};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Metadata file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryStats {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub ratings: Vec<u8>,
}

impl StoryStats {
    /// Mean rating, `0.0` when unrated.
    pub fn average_rating(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.ratings.iter().map(|&r| u64::from(r)).sum();
        sum as f64 / self.ratings.len() as f64
    }

    pub fn rating_count(&self) -> usize {
        self.ratings.len()
    }
}

/// Store for [`StoryStats`]. `update` is one atomic read-modify-write, so
/// concurrent viewers and raters never lose each other's changes.
pub trait MetadataStore: Send + Sync {
    /// Stats for `filename`; unknown files have zero views and no ratings.
    fn get(&self, filename: &str) -> Result<StoryStats, MetadataError>;

    /// Applies `change` to the stats for `filename` and returns the result.
    fn update(
        &self,
        filename: &str,
        change: &mut dyn FnMut(&mut StoryStats),
    ) -> Result<StoryStats, MetadataError>;
}

/// Builds the configured backend.
pub fn open_store(config: &Config, db: &Database) -> Box<dyn MetadataStore> {
    match config.metadata.backend {
        MetadataBackend::Sqlite => Box::new(SqliteMetadataStore::new(db.clone())),
        MetadataBackend::JsonFile => {
            Box::new(JsonFileMetadataStore::new(&config.paths.metadata_file))
        }
    }
}
