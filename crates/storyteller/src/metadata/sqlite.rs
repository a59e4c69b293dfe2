use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{MetadataError, MetadataStore, StoryStats};
use crate::db::{Database, DatabaseError};

/// Stats in the `story_metadata` table, ratings as a JSON array column.
pub struct SqliteMetadataStore {
    db: Database,
}

impl SqliteMetadataStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn decode_ratings(raw: &str) -> Result<Vec<u8>, DatabaseError> {
    serde_json::from_str(raw).map_err(|source| DatabaseError::Json {
        column: "story_metadata.ratings",
        source,
    })
}

fn load(conn: &rusqlite::Connection, filename: &str) -> Result<StoryStats, DatabaseError> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT views, ratings FROM story_metadata WHERE filename = ?1",
            params![filename],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match row {
        Some((views, ratings)) => Ok(StoryStats {
            views: views.max(0) as u64,
            ratings: decode_ratings(&ratings)?,
        }),
        None => Ok(StoryStats::default()),
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn get(&self, filename: &str) -> Result<StoryStats, MetadataError> {
        Ok(self.db.with_conn(|conn| load(conn, filename))?)
    }

    fn update(
        &self,
        filename: &str,
        change: &mut dyn FnMut(&mut StoryStats),
    ) -> Result<StoryStats, MetadataError> {
        let stats = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut stats = load(&tx, filename)?;
            change(&mut stats);

            let ratings = serde_json::to_string(&stats.ratings).map_err(|source| {
                DatabaseError::Json {
                    column: "story_metadata.ratings",
                    source,
                }
            })?;
            tx.execute(
                "INSERT INTO story_metadata (filename, views, ratings) VALUES (?1, ?2, ?3)
                 ON CONFLICT(filename) DO UPDATE SET views = excluded.views, ratings = excluded.ratings",
                params![filename, stats.views as i64, ratings],
            )?;
            tx.commit()?;
            Ok(stats)
        })?;
        Ok(stats)
    }
}
