//! Storage trait definitions

use crate::models::Cursor;
use anyhow::Result;

/// Durable mapping from mailbox identity to its last processed cursor
///
/// A store that has never been written to behaves exactly like one that
/// holds no record for the mailbox: `get` returns `Ok(None)`.
///
/// Upserts for different mailboxes must not interfere with each other.
/// Concurrent upserts for the same mailbox are last-writer-wins; callers
/// that need ordering serialize them (see `HistorySyncEngine`).
pub trait CursorStore: Send + Sync {
    /// Get the cursor for a mailbox
    fn get(&self, mailbox_id: &str) -> Result<Option<Cursor>>;

    /// Insert or replace the cursor for `cursor.mailbox_id`
    fn upsert(&self, cursor: Cursor) -> Result<()>;
}
