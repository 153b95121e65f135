//! JSON file cursor storage
//!
//! The default backend: every cursor lives in one JSON array of
//! `{emailAddress, prevHistoryId}` records, read and rewritten wholesale on
//! each upsert.

use anyhow::{Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::CursorStore;
use crate::models::Cursor;

/// Cursor store backed by a single JSON file
///
/// Rewrites go through a temp file and a rename, so a crash mid-write never
/// leaves a truncated array behind. Read-modify-write cycles are serialized
/// within the process; separate processes sharing one file are not
/// coordinated and should use [`super::SqliteCursorStore`] instead.
pub struct JsonFileCursorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileCursorStore {
    /// File name used when no path is configured
    pub const DEFAULT_FILE: &'static str = "gmailpush_history.json";

    /// Create a store at the given path; the file is created on first use
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record; a missing or blank file is an empty list
    fn load_all(&self) -> Result<Vec<Cursor>> {
        config::load_json_file_or_default(&self.path)
    }
}

impl Default for JsonFileCursorStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FILE)
    }
}

impl CursorStore for JsonFileCursorStore {
    fn get(&self, mailbox_id: &str) -> Result<Option<Cursor>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Cursor file lock poisoned"))?;

        if !self.path.exists() {
            debug!("Initializing cursor file {}", self.path.display());
            config::write_json_file_atomic(&self.path, &Vec::<Cursor>::new())?;
            return Ok(None);
        }

        Ok(self
            .load_all()?
            .into_iter()
            .find(|cursor| cursor.mailbox_id == mailbox_id))
    }

    fn upsert(&self, cursor: Cursor) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Cursor file lock poisoned"))?;

        let mut cursors = self.load_all()?;
        match cursors
            .iter_mut()
            .find(|existing| existing.mailbox_id == cursor.mailbox_id)
        {
            Some(existing) => existing.history_id = cursor.history_id,
            None => cursors.push(cursor),
        }

        config::write_json_file_atomic(&self.path, &cursors)
    }
}
