//! History change kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Kind of change recorded by a Gmail history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    MessageAdded,
    MessageDeleted,
    LabelAdded,
    LabelRemoved,
}

impl ChangeKind {
    /// All kinds, in the order used to classify an entry
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::MessageAdded,
        ChangeKind::MessageDeleted,
        ChangeKind::LabelAdded,
        ChangeKind::LabelRemoved,
    ];

    /// Name used for this kind in Gmail's `historyTypes` parameter
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::MessageAdded => "messageAdded",
            ChangeKind::MessageDeleted => "messageDeleted",
            ChangeKind::LabelAdded => "labelAdded",
            ChangeKind::LabelRemoved => "labelRemoved",
        }
    }

    /// Field of a history entry that carries this kind's payload
    pub fn plural_field(self) -> &'static str {
        match self {
            ChangeKind::MessageAdded => "messagesAdded",
            ChangeKind::MessageDeleted => "messagesDeleted",
            ChangeKind::LabelAdded => "labelsAdded",
            ChangeKind::LabelRemoved => "labelsRemoved",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown history type '{}'", s)))
    }
}
