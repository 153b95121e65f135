//! Pub/Sub push payload decoding
//!
//! Gmail's `users.watch` publishes a notification per mailbox change. The
//! push body wraps a base64 JSON document `{emailAddress, historyId}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decode_base64;
use crate::error::DecodeError;

/// Pub/Sub HTTP push body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushPayload {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Pub/Sub message envelope
///
/// Pub/Sub sends both camelCase and snake_case spellings of the ID and
/// publish time fields; either is accepted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PubSubMessage {
    /// Base64-encoded notification data
    pub data: String,
    #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default, rename = "message_id", skip_serializing_if = "Option::is_none")]
    message_id_snake: Option<String>,
    #[serde(default, rename = "publishTime", skip_serializing_if = "Option::is_none")]
    publish_time: Option<String>,
    #[serde(default, rename = "publish_time", skip_serializing_if = "Option::is_none")]
    publish_time_snake: Option<String>,
}

impl PubSubMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_publish_time(mut self, time: impl Into<String>) -> Self {
        self.publish_time = Some(time.into());
        self
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .or(self.message_id_snake.as_deref())
    }

    pub fn publish_time(&self) -> Option<&str> {
        self.publish_time
            .as_deref()
            .or(self.publish_time_snake.as_deref())
    }
}

impl PushPayload {
    pub fn new(message: PubSubMessage) -> Self {
        Self {
            message,
            subscription: None,
        }
    }

    /// Parse a raw push request body
    pub fn from_json(body: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(body).map_err(DecodeError::InvalidEnvelope)
    }
}

/// Decoded push notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEnvelope {
    /// Mailbox the notification is about
    pub mailbox_id: String,
    /// Mailbox history ID at the time of the notification
    pub history_id: u64,
    /// Pub/Sub message ID, when decoded from a full push body
    pub message_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl PushEnvelope {
    pub fn new(mailbox_id: impl Into<String>, history_id: u64) -> Self {
        Self {
            mailbox_id: mailbox_id.into(),
            history_id,
            message_id: None,
            published_at: None,
        }
    }
}

/// Decode the notification carried by a push body
pub fn decode_push_payload(payload: &PushPayload) -> Result<PushEnvelope, DecodeError> {
    let mut envelope = decode_push_data(&payload.message.data)?;
    envelope.message_id = payload.message.message_id().map(str::to_string);
    envelope.published_at = payload
        .message
        .publish_time()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    Ok(envelope)
}

/// Decode base64 notification data into `{mailboxId, historyId}`
pub fn decode_push_data(data: &str) -> Result<PushEnvelope, DecodeError> {
    let bytes = decode_base64(data).ok_or(DecodeError::InvalidBase64)?;
    let text = String::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(&text).map_err(DecodeError::InvalidJson)?;

    let mailbox_id = value
        .get("emailAddress")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("emailAddress"))?;

    let history_id = match value.get("historyId") {
        None | Some(Value::Null) => return Err(DecodeError::MissingField("historyId")),
        // Some publishers serialize integers as floats, e.g. 1509814.0
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| DecodeError::InvalidHistoryId(n.to_string()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| DecodeError::InvalidHistoryId(s.clone()))?,
        Some(other) => return Err(DecodeError::InvalidHistoryId(other.to_string())),
    };

    Ok(PushEnvelope::new(mailbox_id, history_id))
}
