//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. Column additions are conditional so a database
//! created by an older layout (which may already carry the column) can be
//! adopted as is.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

const CREATE_USERS: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    credits INTEGER NOT NULL DEFAULT 10,
    private INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);";

const CREATE_USER_STORIES: &str = "
CREATE TABLE IF NOT EXISTS user_stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (id),
    story_filename TEXT NOT NULL,
    title TEXT,
    theme TEXT,
    theme_description TEXT,
    language TEXT,
    age_range TEXT,
    lesson TEXT,
    characters TEXT,
    story_about TEXT,
    ai_model TEXT,
    provider TEXT,
    audio_file TEXT,
    processing_time REAL,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_user_stories_filename ON user_stories (story_filename);
CREATE INDEX IF NOT EXISTS idx_user_stories_user ON user_stories (user_id);";

const ADD_STORY_PRIVACY: &str = "ALTER TABLE user_stories ADD COLUMN is_private INTEGER;";

const CREATE_STORY_METADATA: &str = "
CREATE TABLE IF NOT EXISTS story_metadata (
    filename TEXT PRIMARY KEY,
    views INTEGER NOT NULL DEFAULT 0,
    ratings TEXT NOT NULL DEFAULT '[]'
);";

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_users_table",
        sql: CREATE_USERS,
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_user_stories_table",
        sql: CREATE_USER_STORIES,
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "add_is_private_to_user_stories",
        sql: ADD_STORY_PRIVACY,
        kind: MigrationKind::AddColumn {
            table: "user_stories",
            column: "is_private",
        },
    },
    Migration {
        version: 4,
        description: "create_story_metadata_table",
        sql: CREATE_STORY_METADATA,
        kind: MigrationKind::Standard,
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            conn.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!(
                "Skipping migration v{} (column already present)",
                migration.version
            );
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}
