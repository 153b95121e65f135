//! Pushsync crate - Gmail push-triggered incremental history sync
//!
//! This crate turns Pub/Sub "mailbox changed" notifications into the list of
//! messages that changed, including:
//! - Push payload decoding
//! - Per-mailbox history cursors with pluggable storage (JSON file, SQLite, memory)
//! - Monotonic cursor decisions and paginated delta-log fetching
//! - History entry classification, message resolution and MIME parsing
//! - Label filtering and on-demand attachment fetching
//!
//! The remote mailbox is reached through the [`gmail::MailboxApi`] trait, so
//! everything above the HTTP client can run against an in-process fake.

pub mod config;
pub mod error;
pub mod gmail;
pub mod models;
pub mod storage;
pub mod sync;

pub use config::{CursorStoreConfig, ServiceConfig};
pub use error::{ConfigError, DecodeError, HistoryExpiredError, NotFoundError};
pub use gmail::{GmailClient, MailboxApi, PubSubMessage, PushEnvelope, PushPayload, UserCredentials};
pub use models::{AttachmentMeta, ChangeKind, Cursor, EmailAddress, MessageHeaders, MessageId, ResolvedMessage};
pub use storage::{CursorStore, InMemoryCursorStore, JsonFileCursorStore, SqliteCursorStore};
pub use sync::{
    // Sync execution
    PushSync, SyncOptions, SyncReport, SyncStats,
    // Building blocks
    AttachmentFetcher, CursorCommit, HistorySyncEngine, LabelFilter, MessageQuery, MessageResolver,
    SyncDecision,
};
