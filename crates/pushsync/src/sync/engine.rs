//! Cursor decisions and delta-log pagination

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::gmail::api::HistoryRecord;
use crate::gmail::{MailboxApi, PushEnvelope, UserCredentials};
use crate::models::Cursor;
use crate::storage::CursorStore;

/// When the advanced cursor is persisted relative to the delta fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CursorCommit {
    /// Persist first, then fetch. A crash mid-fetch loses that delta.
    #[default]
    BeforeFetch,
    /// Fetch first, then persist. A failed fetch is re-delivered on retry.
    AfterFetch,
}

/// Outcome of comparing a push against the stored cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// The push is older than the stored cursor; fetch nothing
    Skip,
    /// Fetch the delta log starting at `from_history_id`
    Proceed { from_history_id: u64 },
}

impl SyncDecision {
    pub fn proceeds(&self) -> bool {
        matches!(self, Self::Proceed { .. })
    }
}

/// How a push relates to the stored cursor
enum Transition {
    /// No cursor yet for this mailbox
    Baseline,
    /// Push is behind the stored cursor
    Stale(Cursor),
    /// Push is at or past the stored cursor
    Advance { from: u64 },
}

/// Decides whether a push needs a delta fetch and keeps the cursor monotonic
///
/// Read, compare and write for one mailbox run under that mailbox's lock,
/// so concurrent pushes for the same mailbox never move its cursor backwards.
/// A mailbox's lock is dropped from the table once no call holds or awaits
/// it, so the table only ever covers mailboxes with a push in flight.
pub struct HistorySyncEngine {
    api: Arc<dyn MailboxApi>,
    store: Arc<dyn CursorStore>,
    commit: CursorCommit,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HistorySyncEngine {
    pub fn new(api: Arc<dyn MailboxApi>, store: Arc<dyn CursorStore>, commit: CursorCommit) -> Self {
        Self {
            api,
            store,
            commit,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn commit(&self) -> CursorCommit {
        self.commit
    }

    /// Compare a push with the stored cursor and persist the result
    ///
    /// Always persists before returning, whatever the commit policy.
    pub fn synchronize(&self, envelope: &PushEnvelope) -> Result<SyncDecision> {
        self.with_mailbox_lock(&envelope.mailbox_id, || {
            let transition = self.transition(envelope)?;
            self.persist(envelope, &transition)?;
            Ok(Self::decision(envelope, &transition))
        })
    }

    /// Page through the delta log after `from_history_id`
    ///
    /// Pages are requested one after another and concatenated in server
    /// order.
    pub fn fetch_delta_log(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        from_history_id: u64,
    ) -> Result<Vec<HistoryRecord>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let response = self.api.list_history(
                credentials,
                mailbox_id,
                from_history_id,
                page_token.as_deref(),
            )?;
            pages += 1;

            let page = response.history.unwrap_or_default();
            debug!(
                "History page {} for {}: {} entries",
                pages,
                mailbox_id,
                page.len()
            );
            entries.extend(page);

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(
            "Fetched {} history entries for {} since {} in {} pages",
            entries.len(),
            mailbox_id,
            from_history_id,
            pages
        );
        Ok(entries)
    }

    /// Decide, persist and fetch according to the commit policy
    ///
    /// Returns `None` when the push is stale.
    pub fn sync_delta(
        &self,
        envelope: &PushEnvelope,
        credentials: &UserCredentials,
    ) -> Result<Option<Vec<HistoryRecord>>> {
        match self.commit {
            CursorCommit::BeforeFetch => match self.synchronize(envelope)? {
                SyncDecision::Skip => Ok(None),
                SyncDecision::Proceed { from_history_id } => self
                    .fetch_delta_log(credentials, &envelope.mailbox_id, from_history_id)
                    .map(Some),
            },
            CursorCommit::AfterFetch => self.with_mailbox_lock(&envelope.mailbox_id, || {
                let transition = self.transition(envelope)?;
                let entries = match Self::decision(envelope, &transition) {
                    SyncDecision::Skip => None,
                    SyncDecision::Proceed { from_history_id } => Some(self.fetch_delta_log(
                        credentials,
                        &envelope.mailbox_id,
                        from_history_id,
                    )?),
                };

                self.persist(envelope, &transition)?;
                Ok(entries)
            }),
        }
    }

    /// Run `op` holding the mailbox's lock, then drop the lock from the
    /// table if nothing else is holding or waiting on it
    fn with_mailbox_lock<T>(&self, mailbox_id: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.lock_table()?.entry(mailbox_id.to_string()).or_default());

        let result = match lock.lock() {
            Ok(_guard) => op(),
            Err(_) => Err(anyhow!("Mailbox lock poisoned for {}", mailbox_id)),
        };

        // One reference lives in the table and one here; any more belong to waiters.
        // New references are only taken under the table lock.
        let mut locks = self.lock_table()?;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(mailbox_id);
        }

        result
    }

    fn lock_table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>>> {
        self.locks
            .lock()
            .map_err(|_| anyhow!("Mailbox lock table poisoned"))
    }

    fn transition(&self, envelope: &PushEnvelope) -> Result<Transition> {
        let transition = match self.store.get(&envelope.mailbox_id)? {
            None => Transition::Baseline,
            Some(prior) if envelope.history_id < prior.history_id => Transition::Stale(prior),
            Some(prior) => Transition::Advance {
                from: prior.history_id,
            },
        };
        Ok(transition)
    }

    fn persist(&self, envelope: &PushEnvelope, transition: &Transition) -> Result<()> {
        match transition {
            Transition::Baseline => {
                info!(
                    "No cursor for {}, baselining at {}",
                    envelope.mailbox_id, envelope.history_id
                );
                self.store
                    .upsert(Cursor::new(&envelope.mailbox_id, envelope.history_id))
            }
            Transition::Stale(prior) => {
                warn!(
                    "Stale push for {}: {} is behind stored cursor {}",
                    envelope.mailbox_id, envelope.history_id, prior.history_id
                );
                self.store.upsert(prior.clone())
            }
            Transition::Advance { from } => {
                info!(
                    "Advancing cursor for {} from {} to {}",
                    envelope.mailbox_id, from, envelope.history_id
                );
                self.store
                    .upsert(Cursor::new(&envelope.mailbox_id, *from).advanced(envelope.history_id))
            }
        }
    }

    fn decision(envelope: &PushEnvelope, transition: &Transition) -> SyncDecision {
        match transition {
            Transition::Baseline => SyncDecision::Proceed {
                from_history_id: envelope.history_id,
            },
            Transition::Stale(_) => SyncDecision::Skip,
            Transition::Advance { from } => SyncDecision::Proceed {
                from_history_id: *from,
            },
        }
    }
}
