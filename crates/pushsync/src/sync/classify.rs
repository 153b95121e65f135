//! History entry classification and filtering

use std::collections::HashSet;

use crate::gmail::api::{HistoryRecord, MessageRef};
use crate::models::ChangeKind;

/// Field name a history entry uses for `kind`'s payload
pub fn pluralize(kind: ChangeKind) -> &'static str {
    kind.plural_field()
}

impl HistoryRecord {
    /// Whether this entry carries a payload for `kind`
    ///
    /// Presence is what counts: an empty array still carries the kind.
    pub fn carries(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::MessageAdded => self.messages_added.is_some(),
            ChangeKind::MessageDeleted => self.messages_deleted.is_some(),
            ChangeKind::LabelAdded => self.labels_added.is_some(),
            ChangeKind::LabelRemoved => self.labels_removed.is_some(),
        }
    }

    /// Messages listed in the payload for `kind`
    pub fn messages_for(&self, kind: ChangeKind) -> Vec<&MessageRef> {
        match kind {
            ChangeKind::MessageAdded => self
                .messages_added
                .iter()
                .flatten()
                .map(|c| &c.message)
                .collect(),
            ChangeKind::MessageDeleted => self
                .messages_deleted
                .iter()
                .flatten()
                .map(|c| &c.message)
                .collect(),
            ChangeKind::LabelAdded => self
                .labels_added
                .iter()
                .flatten()
                .map(|c| &c.message)
                .collect(),
            ChangeKind::LabelRemoved => self
                .labels_removed
                .iter()
                .flatten()
                .map(|c| &c.message)
                .collect(),
        }
    }

    /// IDs of every message this entry touches, each once, in entry order
    ///
    /// Taken from `messages` when the server sent it, otherwise gathered
    /// from the typed payloads.
    pub fn message_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let refs: Vec<&MessageRef> = match &self.messages {
            Some(messages) => messages.iter().collect(),
            None => ChangeKind::ALL
                .into_iter()
                .flat_map(|kind| self.messages_for(kind))
                .collect(),
        };

        refs.into_iter()
            .map(|m| m.id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// The first kind, in canonical order, that `entry` carries
pub fn classify(entry: &HistoryRecord) -> Option<ChangeKind> {
    ChangeKind::ALL.into_iter().find(|kind| entry.carries(*kind))
}

/// The kind of change `entry` records for one of its messages
///
/// Prefers the first kind whose payload lists the message; falls back to
/// the entry's own classification.
pub fn kind_for_message(entry: &HistoryRecord, message_id: &str) -> Option<ChangeKind> {
    ChangeKind::ALL
        .into_iter()
        .find(|kind| {
            entry
                .messages_for(*kind)
                .iter()
                .any(|m| m.id == message_id)
        })
        .or_else(|| classify(entry))
}

/// Keep entries carrying at least one of `kinds`
///
/// Entries are kept once each, in server order, however many requested
/// kinds they carry. A repeated entry ID is dropped.
pub fn filter_by_kinds(entries: Vec<HistoryRecord>, kinds: &[ChangeKind]) -> Vec<HistoryRecord> {
    let mut seen_ids = HashSet::new();

    entries
        .into_iter()
        .filter(|entry| kinds.iter().any(|kind| entry.carries(*kind)))
        .filter(|entry| entry.id.is_empty() || seen_ids.insert(entry.id.clone()))
        .collect()
}
