//! Gmail API response normalization
//!
//! Converts a Gmail message resource into a [`ResolvedMessage`]: headers,
//! both body variants, and attachment metadata from the MIME part tree.

use chrono::{TimeZone, Utc};
use log::debug;

use super::api::{GmailMessage, MessagePart};
use super::decode_base64;
use crate::models::{AttachmentMeta, ChangeKind, EmailAddress, MessageId, ResolvedMessage};

/// Top-level media types collected as attachments
const ATTACHMENT_TYPES: [&str; 7] = ["image", "audio", "video", "application", "font", "text", "model"];

/// Normalize a Gmail API message
///
/// A message without a payload keeps its ID, thread and labels and
/// nothing else.
pub fn parse_message(raw: GmailMessage, change_kind: Option<ChangeKind>) -> ResolvedMessage {
    let mut message = ResolvedMessage::new(MessageId::new(raw.id));
    message.change_kind = change_kind;
    message.thread_id = raw.thread_id;
    message.label_ids = raw.label_ids.unwrap_or_default().into_iter().collect();
    message.snippet = raw.snippet;
    message.history_id = raw.history_id.and_then(|h| h.parse().ok());
    message.internal_date = raw
        .internal_date
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    let Some(payload) = raw.payload else {
        return message;
    };

    let headers = &mut message.headers;
    headers.from = extract_header(&payload, "From").map(parse_email_address_header);
    headers.to = extract_header(&payload, "To").map(parse_address_list).unwrap_or_default();
    headers.cc = extract_header(&payload, "Cc").map(parse_address_list).unwrap_or_default();
    headers.bcc = extract_header(&payload, "Bcc").map(parse_address_list).unwrap_or_default();
    headers.subject = extract_header(&payload, "Subject").map(str::to_string);
    headers.date = extract_header(&payload, "Date").map(str::to_string);

    parse_payload(&payload, &mut message);
    message
}

/// Walk a MIME part tree, accumulating bodies and attachments into `message`
///
/// Parts are visited depth-first in document order. The last `text/html`
/// and `text/plain` leaves win; other leaves with a known top-level type
/// become attachment entries. Anything else is skipped.
pub fn parse_payload(root: &MessagePart, message: &mut ResolvedMessage) {
    let mut stack = vec![root];

    while let Some(part) = stack.pop() {
        let mime_type = media_essence(part.mime_type.as_deref().unwrap_or_default());

        if mime_type.starts_with("multipart/") {
            if let Some(children) = &part.parts {
                stack.extend(children.iter().rev());
            }
            continue;
        }

        match mime_type.as_str() {
            "text/html" => {
                if let Some(html) = decode_body_text(part) {
                    message.body_html = Some(html);
                }
            }
            "text/plain" => {
                if let Some(text) = decode_body_text(part) {
                    message.body_text = Some(text);
                }
            }
            other => match other.split_once('/') {
                Some((top, _)) if ATTACHMENT_TYPES.contains(&top) => {
                    message.attachments.push(attachment_meta(part, &mime_type));
                }
                _ => debug!(
                    "Skipping part {:?} of message {} with type '{}'",
                    part.part_id,
                    message.id.as_str(),
                    other
                ),
            },
        }
    }
}

/// Parse a single address header value into name and address
pub fn parse_email_address_header(value: &str) -> EmailAddress {
    EmailAddress::parse(value)
}

/// Extract a header value by name
fn extract_header<'a>(payload: &'a MessagePart, name: &str) -> Option<&'a str> {
    payload
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Parse a ", "-separated list of email addresses
fn parse_address_list(s: &str) -> Vec<EmailAddress> {
    s.split(", ").map(parse_email_address_header).collect()
}

/// Lowercased media type without parameters
fn media_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Decode a part's inline body as text
fn decode_body_text(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    match decode_base64(data) {
        Some(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        None => {
            debug!("Undecodable body in part {:?}", part.part_id);
            None
        }
    }
}

fn attachment_meta(part: &MessagePart, mime_type: &str) -> AttachmentMeta {
    let body = part.body.as_ref();
    let attachment_id = body.and_then(|b| b.attachment_id.clone());

    // Small parts come inline instead of behind an attachment ID
    let data = match attachment_id {
        Some(_) => None,
        None => body.and_then(|b| b.data.as_deref()).and_then(decode_base64),
    };

    AttachmentMeta {
        mime_type: mime_type.to_string(),
        filename: part.filename.clone().unwrap_or_default(),
        attachment_id,
        size_bytes: body.and_then(|b| b.size).unwrap_or(0),
        data,
    }
}
