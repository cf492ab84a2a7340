//! Chat persistence on SQLite

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt chat messages: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Chat {0} belongs to another user")]
    NotOwner(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Insert or replace the whole record. A chat owned by another user is
    /// left untouched.
    pub fn save_chat(&self, record: &ChatRecord) -> DbResult<()> {
        let messages = serde_json::to_string(&record.messages)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO chats (id, user_id, title, path, created_at, updated_at, messages)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                path = excluded.path,
                updated_at = excluded.updated_at,
                messages = excluded.messages
             WHERE chats.user_id = excluded.user_id",
            params![
                record.id,
                record.user_id,
                record.title,
                record.path,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                messages,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotOwner(record.id.clone()));
        }
        Ok(())
    }

    /// Get a chat owned by `user_id`
    pub fn get_chat(&self, user_id: &str, id: &str) -> DbResult<Option<ChatRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, user_id, title, path, created_at, updated_at, messages
                 FROM chats WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, user_id, title, path, created_at, updated_at, messages)) = row else {
            return Ok(None);
        };
        Ok(Some(ChatRecord {
            id,
            title,
            user_id,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
            path,
            messages: serde_json::from_str(&messages)?,
        }))
    }

    /// Chats of `user_id`, most recently updated first
    pub fn list_chats(&self, user_id: &str) -> DbResult<Vec<ChatSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, path, created_at, updated_at
             FROM chats WHERE user_id = ?1
             ORDER BY updated_at DESC, id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ChatSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                path: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
                updated_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Returns whether a chat was removed
    pub fn delete_chat(&self, user_id: &str, id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM chats WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(removed > 0)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
