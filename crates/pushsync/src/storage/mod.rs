//! Cursor storage traits and implementations
//!
//! The trait-based design allows swapping between the default JSON file,
//! SQLite and in-memory backends.

mod file;
mod memory;
mod sqlite;
mod traits;

pub use file::JsonFileCursorStore;
pub use memory::InMemoryCursorStore;
pub use sqlite::SqliteCursorStore;
pub use traits::CursorStore;
