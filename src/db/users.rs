//! User records.

use chrono::Utc;
use rusqlite::{params, ErrorCode, Row};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{User, UserId};

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

impl Database {
    /// Insert a user. A taken username is a `BadRequest`.
    pub fn create_user(&self, username: &str) -> Result<User> {
        let created_at = Utc::now();
        let inserted = self.conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?, ?)",
            params![username, created_at],
        );

        match inserted {
            Ok(_) => Ok(User {
                id: self.conn.last_insert_rowid(),
                username: username.to_string(),
                created_at,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::bad_request(format!("Username already taken: {}", username)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let result = self.conn.query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?",
            [id],
            user_from_row,
        );
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let result = self.conn.query_row(
            "SELECT id, username, created_at FROM users WHERE username = ?",
            [username],
            user_from_row,
        );
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All users, ordered by username.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, created_at FROM users ORDER BY username")?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Delete a user. Their images, albums and memberships go with them.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    pub fn count_images(&self, owner_id: UserId) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE owner_id = ?",
            [owner_id],
            |row| row.get(0),
        )?)
    }

    pub fn count_albums(&self, owner_id: UserId) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM albums WHERE owner_id = ?",
            [owner_id],
            |row| row.get(0),
        )?)
    }
}
