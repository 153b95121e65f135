//! Gmail API integration
//!
//! This module provides:
//! - Pub/Sub push payload decoding
//! - The `MailboxApi` seam over the remote history/message/attachment calls
//! - A blocking Gmail REST client implementing it
//! - Message payload normalization (MIME walk, header parsing)

mod auth;
mod client;
mod normalize;
mod push;

use anyhow::Result;

use crate::models::MessageId;

pub use auth::UserCredentials;
pub use client::GmailClient;
pub use normalize::{parse_email_address_header, parse_message, parse_payload};
pub use push::{PubSubMessage, PushEnvelope, PushPayload, decode_push_data, decode_push_payload};

use api::{AttachmentBody, GmailMessage, HistoryResponse};

/// Remote mailbox capabilities the sync pipeline depends on
///
/// Implemented by [`GmailClient`] for the real service. Every call is
/// scoped to a mailbox identity and carries the credentials authorizing
/// it; implementors pass them through and never cache them.
pub trait MailboxApi: Send + Sync {
    /// List one page of history records after `start_history_id`
    fn list_history(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        start_history_id: u64,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse>;

    /// Fetch a full message
    ///
    /// A message the server does not have must be reported as
    /// [`crate::error::NotFoundError`].
    fn get_message(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        id: &MessageId,
    ) -> Result<GmailMessage>;

    /// Fetch the body of one attachment
    fn get_attachment(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<AttachmentBody>;
}

/// Decode base64 data as Gmail and Pub/Sub emit it
///
/// Gmail uses URL-safe base64 while Pub/Sub uses the standard alphabet, and
/// padding varies, so every combination is tried.
pub(crate) fn decode_base64(data: &str) -> Option<Vec<u8>> {
    use base64::prelude::*;

    let data = data.trim();
    let decoders: [&base64::engine::GeneralPurpose; 4] = [
        &BASE64_STANDARD,
        &BASE64_STANDARD_NO_PAD,
        &BASE64_URL_SAFE,
        &BASE64_URL_SAFE_NO_PAD,
    ];

    decoders.iter().find_map(|decoder| decoder.decode(data).ok())
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// One page of `users.history.list`
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        pub next_page_token: Option<String>,
        /// Current history ID of the mailbox
        pub history_id: Option<String>,
    }

    /// One entry of the mailbox change log
    ///
    /// Each typed field is present only when the entry carries that kind of
    /// change; several may be present at once.
    #[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        #[serde(default)]
        pub id: String,
        /// Every message touched by this entry
        #[serde(skip_serializing_if = "Option::is_none")]
        pub messages: Option<Vec<MessageRef>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub messages_added: Option<Vec<HistoryMessageChange>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub messages_deleted: Option<Vec<HistoryMessageChange>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub labels_added: Option<Vec<HistoryLabelChange>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub labels_removed: Option<Vec<HistoryLabelChange>>,
    }

    /// A message added to or deleted from the mailbox
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    pub struct HistoryMessageChange {
        pub message: MessageRef,
    }

    /// Labels added to or removed from a message
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryLabelChange {
        pub message: MessageRef,
        #[serde(default)]
        pub label_ids: Vec<String>,
    }

    /// Reference to a message (ID plus whatever the server attached)
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
    }

    /// Full message from Gmail API (`format=full`)
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        pub snippet: Option<String>,
        pub history_id: Option<String>,
        /// Milliseconds since epoch, as a decimal string
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// A node of the MIME part tree; the top-level payload is one too
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessagePartBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Body of a part: inline base64 data, or a reference to an attachment
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePartBody {
        pub attachment_id: Option<String>,
        pub size: Option<u64>,
        pub data: Option<String>,
    }

    /// Response of `users.messages.attachments.get`
    pub type AttachmentBody = MessagePartBody;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_variants() {
        // "Hello, World!" in each alphabet/padding combination
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ=="), Some(b"Hello, World!".to_vec()));
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ"), Some(b"Hello, World!".to_vec()));
        // 0xfb 0xff encodes with '+' and '/' in standard, '-' and '_' in url-safe
        assert_eq!(decode_base64("-_8="), Some(vec![0xfb, 0xff]));
        assert_eq!(decode_base64("+/8"), Some(vec![0xfb, 0xff]));
    }

    #[test]
    fn test_decode_base64_invalid() {
        assert_eq!(decode_base64("not base64!"), None);
    }

    #[test]
    fn test_history_record_field_presence() {
        let json = r#"{
            "id": "1509763",
            "messages": [{"id": "18a11d272f0ddbbb", "threadId": "18a11d272f0ddbbb"}],
            "messagesAdded": [{
                "message": {
                    "id": "18a11d272f0ddbbb",
                    "threadId": "18a11d272f0ddbbb",
                    "labelIds": ["UNREAD", "CATEGORY_PERSONAL", "INBOX"]
                }
            }]
        }"#;

        let record: api::HistoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "1509763");
        assert_eq!(record.messages_added.as_ref().unwrap().len(), 1);
        assert!(record.labels_added.is_none());
    }
}
