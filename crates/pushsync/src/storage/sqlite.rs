//! SQLite-based cursor storage
//!
//! Each upsert is a single-row `INSERT ... ON CONFLICT` statement, so writes
//! for one mailbox never rewrite another mailbox's record.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::CursorStore;
use crate::models::Cursor;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE cursors (
                mailbox_id TEXT PRIMARY KEY,
                history_id INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-based cursor storage
pub struct SqliteCursorStore {
    conn: Mutex<Connection>,
}

impl SqliteCursorStore {
    /// Open (or create) a cursor database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers proceed during a write; NORMAL sync is safe with WAL.
        // busy_timeout covers other processes holding the write lock.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Cursor database lock poisoned"))
    }
}

impl CursorStore for SqliteCursorStore {
    fn get(&self, mailbox_id: &str) -> Result<Option<Cursor>> {
        let conn = self.conn()?;

        let history_id: Option<i64> = conn
            .query_row(
                "SELECT history_id FROM cursors WHERE mailbox_id = ?1",
                params![mailbox_id],
                |row| row.get(0),
            )
            .optional()?;

        history_id
            .map(|h| {
                let history_id = u64::try_from(h)
                    .with_context(|| format!("Negative history ID stored for {}", mailbox_id))?;
                Ok(Cursor::new(mailbox_id, history_id))
            })
            .transpose()
    }

    fn upsert(&self, cursor: Cursor) -> Result<()> {
        let history_id = i64::try_from(cursor.history_id)
            .with_context(|| format!("History ID {} out of range", cursor.history_id))?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO cursors (mailbox_id, history_id, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(mailbox_id) DO UPDATE SET
                history_id = excluded.history_id,
                updated_at = excluded.updated_at
            "#,
            params![cursor.mailbox_id, history_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
