//! Story repository: one `user_stories` row per rendered artifact.
//!
//! Rows are keyed by artifact filename. Reads heal the table lazily: a row
//! whose artifact is gone from the stories directory is deleted on sight.

use std::path::Path;

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_text, Database, DatabaseError};
use crate::job::JobRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryRow {
    pub id: i64,
    pub user_id: i64,
    pub story_filename: String,
    pub title: Option<String>,
    pub theme: Option<String>,
    pub theme_description: Option<String>,
    pub language: Option<String>,
    pub age_range: Option<String>,
    pub lesson: Option<String>,
    pub characters: Option<String>,
    pub story_about: Option<String>,
    pub ai_model: Option<String>,
    pub provider: Option<String>,
    pub audio_file: Option<String>,
    pub processing_time: Option<f64>,
    /// `None` defers to the owner's account default.
    pub is_private: Option<bool>,
    pub created_at: String,
}

impl StoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            story_filename: row.get("story_filename")?,
            title: row.get("title")?,
            theme: row.get("theme")?,
            theme_description: row.get("theme_description")?,
            language: row.get("language")?,
            age_range: row.get("age_range")?,
            lesson: row.get("lesson")?,
            characters: row.get("characters")?,
            story_about: row.get("story_about")?,
            ai_model: row.get("ai_model")?,
            provider: row.get("provider")?,
            audio_file: row.get("audio_file")?,
            processing_time: row.get("processing_time")?,
            is_private: row.get("is_private")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts or refreshes the row for a completed job. `owner` overrides the
/// record's own `user_id`.
pub fn upsert_from_record(
    db: &Database,
    record: &JobRecord,
    owner: Option<i64>,
) -> Result<i64, DatabaseError> {
    let user_id = owner.or(record.user_id).ok_or_else(|| DatabaseError::Invalid {
        entity: "story",
        reason: format!("job {} has no user", record.request_id),
    })?;
    let filename = record
        .output_file
        .as_deref()
        .ok_or_else(|| DatabaseError::Invalid {
            entity: "story",
            reason: format!("job {} has no output file", record.request_id),
        })?;

    let story = &record.parameters;
    let (provider, model) = match &record.ai_info {
        Some(info) => (Some(info.provider.as_str()), info.model.as_str()),
        None => (None, story.ai_model.as_str()),
    };
    let processing_time = record.timing.as_ref().map(|t| t.total_processing_seconds);
    let created_at = record
        .completed_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(now_text);

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO user_stories (user_id, story_filename, title, theme, theme_description,
             language, age_range, lesson, characters, story_about, ai_model, provider,
             audio_file, processing_time, is_private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(story_filename) DO UPDATE SET
               user_id = excluded.user_id,
               title = excluded.title,
               theme = excluded.theme,
               theme_description = excluded.theme_description,
               language = excluded.language,
               age_range = excluded.age_range,
               lesson = excluded.lesson,
               characters = excluded.characters,
               story_about = excluded.story_about,
               ai_model = excluded.ai_model,
               provider = excluded.provider,
               audio_file = excluded.audio_file,
               processing_time = excluded.processing_time,
               is_private = COALESCE(user_stories.is_private, excluded.is_private)",
            params![
                user_id,
                filename,
                story.title,
                story.theme,
                story.theme_description,
                story.language,
                story.age_range,
                story.lesson,
                story.characters,
                story.story_about,
                model,
                provider,
                record.audio_file,
                processing_time,
                story.is_private,
                created_at,
            ],
        )?;
        Ok(conn.query_row(
            "SELECT id FROM user_stories WHERE story_filename = ?1",
            params![filename],
            |r| r.get(0),
        )?)
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<StoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM user_stories WHERE id = ?1",
                params![id],
                StoryRow::from_row,
            )
            .optional()?)
    })
}

pub fn find_by_filename(db: &Database, filename: &str) -> Result<Option<StoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM user_stories WHERE story_filename = ?1",
                params![filename],
                StoryRow::from_row,
            )
            .optional()?)
    })
}

/// Looks up a story row and checks that its artifact still exists. A row
/// whose artifact is gone is deleted and reported as missing.
pub fn find_details(
    db: &Database,
    id: i64,
    stories_dir: &Path,
) -> Result<Option<StoryRow>, DatabaseError> {
    let Some(row) = find_by_id(db, id)? else {
        return Ok(None);
    };
    if stories_dir.join(&row.story_filename).is_file() {
        return Ok(Some(row));
    }
    log::warn!(
        "Story {} points at missing artifact {}, removing row",
        row.id,
        row.story_filename
    );
    delete(db, row.id)?;
    Ok(None)
}

/// Every story row, newest first, with orphaned rows removed on the way.
pub fn list_all(db: &Database, stories_dir: &Path) -> Result<Vec<StoryRow>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM user_stories ORDER BY created_at DESC, id DESC")?;
        let rows = stmt
            .query_map([], StoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let (present, orphaned): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|row| stories_dir.join(&row.story_filename).is_file());

    for row in &orphaned {
        log::warn!(
            "Removing story row {} for missing artifact {}",
            row.id,
            row.story_filename
        );
        delete(db, row.id)?;
    }
    Ok(present)
}

/// Sets or clears the story-level privacy override. Returns `false` for an
/// unknown story.
pub fn set_privacy(db: &Database, id: i64, is_private: Option<bool>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE user_stories SET is_private = ?2 WHERE id = ?1",
            params![id, is_private],
        )?;
        Ok(changed == 1)
    })
}

pub fn delete(db: &Database, id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM user_stories WHERE id = ?1", params![id])?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::user_repo;
    use crate::job::record::tests::sample_record;
    use crate::job::{AiInfo, Timing};
    use tempfile::TempDir;

    fn completed(filename: &str, user_id: Option<i64>) -> JobRecord {
        let mut record = sample_record();
        record.user_id = user_id;
        record.mark_completed(
            filename.to_string(),
            None,
            AiInfo {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                prompt_tokens: None,
                completion_tokens: None,
            },
            Timing {
                generation_seconds: 2.0,
                audio_seconds: None,
                render_seconds: 0.1,
                total_processing_seconds: 2.5,
            },
        );
        record
    }

    fn setup() -> (Database, i64, TempDir) {
        let db = Database::open_in_memory().unwrap();
        let user = user_repo::create(&db, "ada", "ada@example.com", 10).unwrap();
        (db, user.id, TempDir::new().unwrap())
    }

    #[test]
    fn test_upsert_is_keyed_by_filename() {
        let (db, user_id, _dir) = setup();
        let record = completed("luna_20250101120000.html", Some(user_id));

        let first = upsert_from_record(&db, &record, None).unwrap();
        let second = upsert_from_record(&db, &record, None).unwrap();
        assert_eq!(first, second);

        let row = find_by_filename(&db, "luna_20250101120000.html")
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id, user_id);
        assert_eq!(row.theme.as_deref(), Some("space"));
        assert_eq!(row.provider.as_deref(), Some("openai"));
        assert_eq!(row.processing_time, Some(2.5));
        assert_eq!(row.is_private, None);
    }

    #[test]
    fn test_upsert_requires_owner_and_output() {
        let (db, _, _dir) = setup();
        let record = completed("a.html", None);
        assert!(matches!(
            upsert_from_record(&db, &record, None),
            Err(DatabaseError::Invalid { .. })
        ));

        let mut pending = sample_record();
        pending.user_id = Some(1);
        assert!(upsert_from_record(&db, &pending, None).is_err());
    }

    #[test]
    fn test_upsert_keeps_existing_privacy_override() {
        let (db, user_id, _dir) = setup();
        let record = completed("b.html", Some(user_id));
        let id = upsert_from_record(&db, &record, None).unwrap();
        assert!(set_privacy(&db, id, Some(true)).unwrap());

        upsert_from_record(&db, &record, None).unwrap();
        assert_eq!(find_by_id(&db, id).unwrap().unwrap().is_private, Some(true));
    }

    #[test]
    fn test_find_details_heals_missing_artifact() {
        let (db, user_id, dir) = setup();
        std::fs::write(dir.path().join("present.html"), "<html></html>").unwrap();

        let present = upsert_from_record(&db, &completed("present.html", Some(user_id)), None)
            .unwrap();
        let missing = upsert_from_record(&db, &completed("missing.html", Some(user_id)), None)
            .unwrap();

        assert!(find_details(&db, present, dir.path()).unwrap().is_some());
        assert!(find_details(&db, missing, dir.path()).unwrap().is_none());
        assert!(find_by_id(&db, missing).unwrap().is_none());
    }

    #[test]
    fn test_list_all_drops_orphans() {
        let (db, user_id, dir) = setup();
        std::fs::write(dir.path().join("kept.html"), "<html></html>").unwrap();
        upsert_from_record(&db, &completed("kept.html", Some(user_id)), None).unwrap();
        upsert_from_record(&db, &completed("gone.html", Some(user_id)), None).unwrap();

        let rows = list_all(&db, dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].story_filename, "kept.html");
        assert!(find_by_filename(&db, "gone.html").unwrap().is_none());
    }
}
