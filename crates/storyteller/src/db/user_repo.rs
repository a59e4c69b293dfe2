//! User repository: accounts, credits and the account-level privacy default.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::error::is_constraint_violation;
use super::{now_text, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub credits: i64,
    /// Default visibility for this user's stories.
    pub private: bool,
    pub created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            credits: row.get("credits")?,
            private: row.get("private")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn create(
    db: &Database,
    username: &str,
    email: &str,
    initial_credits: i64,
) -> Result<UserRow, DatabaseError> {
    if username.trim().is_empty() {
        return Err(DatabaseError::Invalid {
            entity: "user",
            reason: "username is empty".to_string(),
        });
    }

    db.with_conn(|conn| {
        let created_at = now_text();
        conn.execute(
            "INSERT INTO users (username, email, credits, private, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![username, email, initial_credits, created_at],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                DatabaseError::AlreadyExists {
                    entity: "user",
                    key: username.to_string(),
                }
            } else {
                DatabaseError::Sqlite(e)
            }
        })?;

        Ok(UserRow {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            credits: initial_credits,
            private: false,
            created_at,
        })
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![id],
                UserRow::from_row,
            )
            .optional()?)
    })
}

pub fn find_by_username(db: &Database, username: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM users WHERE username = ?1",
                params![username],
                UserRow::from_row,
            )
            .optional()?)
    })
}

/// Current balance, or `None` for an unknown user.
pub fn credits(db: &Database, id: i64) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT credits FROM users WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?)
    })
}

/// Adds `amount` (may be negative) and returns the new balance.
pub fn add_credits(db: &Database, id: i64, amount: i64) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET credits = credits + ?2 WHERE id = ?1",
            params![id, amount],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user",
                key: id.to_string(),
            });
        }
        Ok(conn.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?)
    })
}

/// Spends one credit. Returns `false`, changing nothing, when the balance is
/// already zero or the user does not exist.
pub fn use_credit(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET credits = credits - 1 WHERE id = ?1 AND credits > 0",
            params![id],
        )?;
        Ok(changed == 1)
    })
}

pub fn set_private(db: &Database, id: i64, private: bool) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET private = ?2 WHERE id = ?1",
            params![id, private],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user",
                key: id.to_string(),
            });
        }
        Ok(())
    })
}

/// Account-level privacy default. Unknown users count as public.
pub fn is_private(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT private FROM users WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(false))
    })
}
