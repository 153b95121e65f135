//! Domain models for push-driven history sync

mod change;
mod cursor;
mod message;

pub use change::ChangeKind;
pub use cursor::Cursor;
pub use message::{AttachmentMeta, EmailAddress, MessageHeaders, MessageId, ResolvedMessage};
