//! In-memory cursor storage
//!
//! Used for tests and for embedding where cursors need not survive a restart.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::RwLock;

use super::CursorStore;
use crate::models::Cursor;

/// In-memory implementation of CursorStore
#[derive(Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<String, Cursor>>,
}

impl InMemoryCursorStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mailboxes with a stored cursor
    pub fn len(&self) -> Result<usize> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| anyhow!("Cursor store lock poisoned"))?;
        Ok(cursors.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl CursorStore for InMemoryCursorStore {
    fn get(&self, mailbox_id: &str) -> Result<Option<Cursor>> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| anyhow!("Cursor store lock poisoned"))?;
        Ok(cursors.get(mailbox_id).cloned())
    }

    fn upsert(&self, cursor: Cursor) -> Result<()> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| anyhow!("Cursor store lock poisoned"))?;
        cursors.insert(cursor.mailbox_id.clone(), cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start() {
        let store = InMemoryCursorStore::new();
        assert!(store.get("user@gmail.com").unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_upsert_replaces() {
        let store = InMemoryCursorStore::new();
        store.upsert(Cursor::new("a@gmail.com", 1)).unwrap();
        store.upsert(Cursor::new("b@gmail.com", 7)).unwrap();
        store.upsert(Cursor::new("a@gmail.com", 5)).unwrap();

        assert_eq!(store.get("a@gmail.com").unwrap().unwrap().history_id, 5);
        assert_eq!(store.get("b@gmail.com").unwrap().unwrap().history_id, 7);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let store = std::sync::Arc::new(InMemoryCursorStore::new());
        store.upsert(Cursor::new("a@gmail.com", 1)).unwrap();

        let poisoner = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.cursors.write().unwrap();
            panic!("poison the cursor lock");
        })
        .join();

        assert!(store.len().is_err());
        assert!(store.is_empty().is_err());
        assert!(store.get("a@gmail.com").is_err());
    }
}
