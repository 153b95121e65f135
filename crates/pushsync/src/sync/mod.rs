//! Push-triggered incremental history sync
//!
//! Cursor decisions, delta-log pagination, classification, message
//! resolution, label filtering and attachment fetching, wired together by
//! [`PushSync`].

mod attachments;
mod classify;
mod engine;
mod filter;
mod pipeline;
mod resolve;

pub use attachments::AttachmentFetcher;
pub use classify::{classify, filter_by_kinds, kind_for_message, pluralize};
pub use engine::{CursorCommit, HistorySyncEngine, SyncDecision};
pub use filter::{LabelFilter, MessageQuery, matches};
pub use pipeline::{PushSync, SyncOptions, SyncReport, SyncStats};
pub use resolve::MessageResolver;
