//! Message resolution for history entries

use anyhow::Result;
use log::{debug, warn};
use rayon::prelude::*;

use super::classify::kind_for_message;
use crate::error::NotFoundError;
use crate::gmail::api::HistoryRecord;
use crate::gmail::{MailboxApi, UserCredentials, parse_message};
use crate::models::{ChangeKind, MessageId, ResolvedMessage};

/// Fetches and parses the messages a set of history entries refer to
pub struct MessageResolver<'a> {
    api: &'a dyn MailboxApi,
    credentials: &'a UserCredentials,
    mailbox_id: &'a str,
}

impl<'a> MessageResolver<'a> {
    pub fn new(api: &'a dyn MailboxApi, credentials: &'a UserCredentials, mailbox_id: &'a str) -> Self {
        Self {
            api,
            credentials,
            mailbox_id,
        }
    }

    /// Fetch and parse one message
    ///
    /// A message the server no longer has comes back as a not-found stub
    /// rather than an error. Every other failure propagates.
    pub fn resolve(&self, id: &MessageId, change_kind: Option<ChangeKind>) -> Result<ResolvedMessage> {
        match self.api.get_message(self.credentials, self.mailbox_id, id) {
            Ok(raw) => {
                debug!("Resolved message {}", id.as_str());
                Ok(parse_message(raw, change_kind))
            }
            Err(e) if e.downcast_ref::<NotFoundError>().is_some() => {
                warn!("Message {} not found, returning stub", id.as_str());
                Ok(ResolvedMessage::not_found(id.clone(), change_kind))
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve every message referenced by `entries`, in entry order
    ///
    /// Fetches run in parallel on the current rayon pool. Results are paired
    /// back by position, so the output follows entry order and message order
    /// within each entry regardless of completion order.
    pub fn resolve_history(&self, entries: &[HistoryRecord]) -> Result<Vec<ResolvedMessage>> {
        let jobs: Vec<(usize, MessageId)> = entries
            .iter()
            .enumerate()
            .flat_map(|(index, entry)| {
                entry
                    .message_ids()
                    .into_iter()
                    .map(move |id| (index, MessageId::new(id)))
            })
            .collect();

        debug!(
            "Resolving {} messages from {} history entries",
            jobs.len(),
            entries.len()
        );

        jobs.par_iter()
            .map(|(index, id)| {
                let kind = kind_for_message(&entries[*index], id.as_str());
                self.resolve(id, kind)
            })
            .collect()
    }
}
