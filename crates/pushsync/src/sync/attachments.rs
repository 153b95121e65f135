//! Attachment byte fetching

use anyhow::{Context, Result, anyhow};
use log::debug;
use rayon::prelude::*;

use crate::gmail::{MailboxApi, UserCredentials, decode_base64};
use crate::models::{MessageId, ResolvedMessage};

/// Fetches attachment bytes for messages that passed filtering
///
/// Nothing is cached; every call goes to the server.
pub struct AttachmentFetcher<'a> {
    api: &'a dyn MailboxApi,
    credentials: &'a UserCredentials,
    mailbox_id: &'a str,
}

impl<'a> AttachmentFetcher<'a> {
    pub fn new(api: &'a dyn MailboxApi, credentials: &'a UserCredentials, mailbox_id: &'a str) -> Self {
        Self {
            api,
            credentials,
            mailbox_id,
        }
    }

    /// Fetch and decode one attachment
    pub fn fetch_bytes(&self, message_id: &MessageId, attachment_id: &str) -> Result<Vec<u8>> {
        let body = self
            .api
            .get_attachment(self.credentials, self.mailbox_id, message_id, attachment_id)?;

        let data = body.data.ok_or_else(|| {
            anyhow!(
                "Attachment {} of message {} has no data",
                attachment_id,
                message_id.as_str()
            )
        })?;

        decode_base64(&data)
            .ok_or_else(|| anyhow!("Invalid base64 in attachment {}", attachment_id))
            .with_context(|| format!("Failed to decode attachment of message {}", message_id.as_str()))
    }

    /// Fill in the bytes of every attachment that still needs them
    ///
    /// Fetches run in parallel across all messages. Returns the number of
    /// attachments fetched; the first failure aborts the rest.
    pub fn fetch_all(&self, messages: &mut [ResolvedMessage]) -> Result<usize> {
        let pending: Vec<(usize, usize, MessageId, String)> = messages
            .iter()
            .enumerate()
            .flat_map(|(m, message)| {
                message
                    .attachments
                    .iter()
                    .enumerate()
                    .filter(|(_, attachment)| attachment.needs_fetch())
                    .filter_map(move |(a, attachment)| {
                        let attachment_id = attachment.attachment_id.clone()?;
                        Some((m, a, message.id.clone(), attachment_id))
                    })
            })
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }
        debug!("Fetching {} attachments", pending.len());

        let fetched: Vec<(usize, usize, Vec<u8>)> = pending
            .par_iter()
            .map(|(m, a, message_id, attachment_id)| {
                self.fetch_bytes(message_id, attachment_id)
                    .map(|bytes| (*m, *a, bytes))
            })
            .collect::<Result<_>>()?;

        let count = fetched.len();
        for (m, a, bytes) in fetched {
            messages[m].attachments[a].data = Some(bytes);
        }
        Ok(count)
    }
}
