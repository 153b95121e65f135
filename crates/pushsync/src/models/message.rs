//! Resolved message model produced by the sync pipeline

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::ChangeKind;

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Optional display name, then an address optionally wrapped in angle brackets
static ADDRESS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(.*)\s)?(?:<?(.+@[^>]+)>?)").expect("address header pattern is valid")
});

/// An email address parsed from a header value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name; the address itself when the header carries none
    pub name: String,
    /// Email address (e.g., "john@example.com")
    pub address: String,
}

impl EmailAddress {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Parse a single "Name <addr>" or bare address header value
    ///
    /// Values without anything address-like (e.g. "undisclosed-recipients:;")
    /// come back with both fields set to the raw input.
    pub fn parse(s: &str) -> Self {
        let Some(caps) = ADDRESS_HEADER.captures(s) else {
            return Self::new(s, s);
        };

        let address = caps.get(2).map_or("", |m| m.as_str());
        let name = caps
            .get(1)
            .map(|m| m.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(address);

        Self::new(name, address)
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        if self.name == self.address {
            self.address.clone()
        } else {
            format!("{} <{}>", self.name, self.address)
        }
    }
}

/// Metadata for a message attachment
///
/// `data` stays empty until the attachment bytes are fetched, unless the
/// server inlined them in the message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub mime_type: String,
    pub filename: String,
    /// Gmail attachment ID; absent for parts whose data was inlined
    pub attachment_id: Option<String>,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub data: Option<Vec<u8>>,
}

impl AttachmentMeta {
    /// Whether the bytes still have to be fetched from the server
    pub fn needs_fetch(&self) -> bool {
        self.data.is_none() && self.attachment_id.is_some()
    }
}

/// Address and subject headers of a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub from: Option<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: Option<String>,
    /// Raw `Date` header value
    pub date: Option<String>,
}

/// A message resolved from a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMessage {
    /// Gmail message ID
    pub id: MessageId,
    pub thread_id: Option<String>,
    /// Gmail label IDs (e.g., "INBOX", "SENT", "UNREAD")
    pub label_ids: BTreeSet<String>,
    pub snippet: Option<String>,
    pub history_id: Option<u64>,
    /// Gmail's internal timestamp
    pub internal_date: Option<DateTime<Utc>>,
    /// Kind of change that surfaced this message
    #[serde(rename = "historyType")]
    pub change_kind: Option<ChangeKind>,
    #[serde(flatten)]
    pub headers: MessageHeaders,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
    /// The server no longer has this message (e.g. deleted since the push)
    #[serde(default)]
    pub not_found: bool,
}

impl ResolvedMessage {
    /// An empty message with only its ID set
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            thread_id: None,
            label_ids: BTreeSet::new(),
            snippet: None,
            history_id: None,
            internal_date: None,
            change_kind: None,
            headers: MessageHeaders::default(),
            body_html: None,
            body_text: None,
            attachments: Vec::new(),
            not_found: false,
        }
    }

    /// Stub for a message the server reported as missing
    pub fn not_found(id: MessageId, change_kind: Option<ChangeKind>) -> Self {
        Self {
            change_kind,
            not_found: true,
            ..Self::new(id)
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids.contains(label)
    }
}

/// Serde adapter storing attachment bytes as standard base64
mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_str(&BASE64_STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| BASE64_STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
