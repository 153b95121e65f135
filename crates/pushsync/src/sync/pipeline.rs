//! End-to-end push handling
//!
//! Decode, decide, fetch, classify, resolve, filter and optionally fetch
//! attachments, in that order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;

use super::attachments::AttachmentFetcher;
use super::classify::filter_by_kinds;
use super::engine::{CursorCommit, HistorySyncEngine};
use super::filter::MessageQuery;
use super::resolve::MessageResolver;
use crate::config::ServiceConfig;
use crate::gmail::{GmailClient, MailboxApi, PushPayload, UserCredentials, decode_push_payload};
use crate::models::{MessageId, ResolvedMessage};
use crate::storage::CursorStore;

/// Pipeline tuning
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub commit: CursorCommit,
    /// Worker threads for message and attachment fetches; rayon's global
    /// pool when unset
    pub max_parallel_fetches: Option<usize>,
}

/// Statistics from one push
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// History entries returned by the server
    pub entries_fetched: usize,
    /// Entries left after kind filtering
    pub entries_kept: usize,
    /// Messages fetched, including not-found stubs
    pub messages_resolved: usize,
    /// Messages the server no longer had
    pub messages_not_found: usize,
    /// Messages that passed the label filter
    pub messages_matched: usize,
    pub attachments_fetched: usize,
    /// Whether the push was behind the stored cursor
    pub skipped: bool,
    pub duration_ms: u64,
}

/// Messages produced by one push, with the statistics of producing them
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub messages: Vec<ResolvedMessage>,
    pub stats: SyncStats,
}

/// Push-triggered sync for any number of mailboxes
///
/// Holds no credentials. Each call carries those of the mailbox it serves.
pub struct PushSync {
    engine: HistorySyncEngine,
    api: Arc<dyn MailboxApi>,
    pool: Option<rayon::ThreadPool>,
}

impl PushSync {
    pub fn new(api: Arc<dyn MailboxApi>, store: Arc<dyn CursorStore>, options: SyncOptions) -> Result<Self> {
        let pool = options
            .max_parallel_fetches
            .map(|threads| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("pushsync-fetch-{}", i))
                    .build()
                    .context("Failed to build fetch thread pool")
            })
            .transpose()?;

        Ok(Self {
            engine: HistorySyncEngine::new(Arc::clone(&api), store, options.commit),
            api,
            pool,
        })
    }

    /// Wire a Gmail client and the configured cursor store
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;

        let api = GmailClient::with_timeout(Duration::from_secs(config.request_timeout_secs));
        let options = SyncOptions {
            commit: config.commit,
            max_parallel_fetches: config.max_parallel_fetches,
        };

        Self::new(Arc::new(api), config.open_store()?, options)
    }

    pub fn engine(&self) -> &HistorySyncEngine {
        &self.engine
    }

    /// Handle one push: matching messages in history order, attachments
    /// fetched only when asked for
    pub fn sync_push(
        &self,
        payload: &PushPayload,
        credentials: &UserCredentials,
        query: &MessageQuery,
        fetch_attachments: bool,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        let mut stats = SyncStats::default();

        // Label config errors surface before anything touches the network
        let label_filter = query.label_filter()?;
        let envelope = decode_push_payload(payload)?;

        let Some(entries) = self.engine.sync_delta(&envelope, credentials)? else {
            stats.skipped = true;
            stats.duration_ms = start.elapsed().as_millis() as u64;
            info!("Skipped stale push for {} at {}", envelope.mailbox_id, envelope.history_id);
            return Ok(SyncReport {
                messages: Vec::new(),
                stats,
            });
        };
        stats.entries_fetched = entries.len();

        let entries = filter_by_kinds(entries, &query.history_kinds);
        stats.entries_kept = entries.len();

        let resolver = MessageResolver::new(self.api.as_ref(), credentials, &envelope.mailbox_id);
        let resolved = self.in_pool(|| resolver.resolve_history(&entries))?;
        stats.messages_resolved = resolved.len();
        stats.messages_not_found = resolved.iter().filter(|m| m.not_found).count();

        let mut messages: Vec<ResolvedMessage> = resolved
            .into_iter()
            .filter(|message| label_filter.matches(message))
            .collect();
        stats.messages_matched = messages.len();

        if fetch_attachments {
            let fetcher = AttachmentFetcher::new(self.api.as_ref(), credentials, &envelope.mailbox_id);
            stats.attachments_fetched = self.in_pool(|| fetcher.fetch_all(&mut messages))?;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Push for {} at {}: {} entries fetched, {} kept, {} messages resolved ({} not found), {} matched, {} attachments in {}ms",
            envelope.mailbox_id,
            envelope.history_id,
            stats.entries_fetched,
            stats.entries_kept,
            stats.messages_resolved,
            stats.messages_not_found,
            stats.messages_matched,
            stats.attachments_fetched,
            stats.duration_ms
        );

        Ok(SyncReport { messages, stats })
    }

    /// Matching messages with attachment metadata only
    pub fn get_messages_without_attachments(
        &self,
        payload: &PushPayload,
        credentials: &UserCredentials,
        query: &MessageQuery,
    ) -> Result<Vec<ResolvedMessage>> {
        Ok(self.sync_push(payload, credentials, query, false)?.messages)
    }

    /// Matching messages with attachment bytes filled in
    pub fn get_messages(
        &self,
        payload: &PushPayload,
        credentials: &UserCredentials,
        query: &MessageQuery,
    ) -> Result<Vec<ResolvedMessage>> {
        Ok(self.sync_push(payload, credentials, query, true)?.messages)
    }

    /// Fetch one attachment's bytes
    pub fn get_attachment(
        &self,
        credentials: &UserCredentials,
        mailbox_id: &str,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        AttachmentFetcher::new(self.api.as_ref(), credentials, mailbox_id)
            .fetch_bytes(message_id, attachment_id)
    }

    fn in_pool<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
