//! Per-mailbox history cursor

use serde::{Deserialize, Serialize};

/// Last processed history position for a mailbox
///
/// One record per mailbox identity. The serialized field names match the
/// on-disk format of the JSON cursor file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Mailbox identity (the Gmail address the push was sent for)
    #[serde(rename = "emailAddress")]
    pub mailbox_id: String,
    /// Gmail historyId processed up to
    #[serde(rename = "prevHistoryId")]
    pub history_id: u64,
}

impl Cursor {
    pub fn new(mailbox_id: impl Into<String>, history_id: u64) -> Self {
        Self {
            mailbox_id: mailbox_id.into(),
            history_id,
        }
    }

    /// Return this cursor moved to a new history position
    pub fn advanced(mut self, history_id: u64) -> Self {
        self.history_id = history_id;
        self
    }
}
