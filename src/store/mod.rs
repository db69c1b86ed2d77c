//! Storage contract for durable per-stream message logs.
//!
//! A [`Store`] is a physical record layer: one append-only log per stream,
//! IDs assigned at commit time, no business logic. Two implementations ship
//! with the crate:
//!
//! - [`SqliteStore`]: one SQLite table per stream, reachable via a DSN
//! - [`MemoryStore`]: in-process log with fault injection for tests
//!
//! A store backed by a change-streaming database can implement the same
//! trait; the hub and poll workers only rely on the contract below.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{BusError, Result};
use crate::types::{Message, MessageInput};

/// Prefix shared by every stream table.
pub const STREAM_TABLE_PREFIX: &str = "tablebus_stream_";

/// Durable append log, one per stream name.
///
/// Implementations must be safe to share across threads; every method may be
/// called concurrently for the same or different streams.
pub trait Store: Send + Sync {
    /// Ensure the log for `stream` exists. Never fails because it already does.
    fn create_stream(&self, stream: &str) -> Result<()>;

    /// Whether a log for `stream` exists.
    fn stream_exists(&self, stream: &str) -> Result<bool>;

    /// Names of all streams the store knows about.
    fn list_streams(&self) -> Result<Vec<String>>;

    /// Append `batch` atomically.
    ///
    /// On success the returned messages carry strictly increasing IDs in
    /// input order. On failure none of the batch is visible.
    fn put_messages(&self, stream: &str, batch: &[MessageInput]) -> Result<Vec<Message>>;

    /// Up to `limit` messages with ID strictly greater than `after`, ascending,
    /// plus the largest ID returned (0 if none).
    fn fetch_messages(&self, stream: &str, after: i64, limit: usize)
        -> Result<(Vec<Message>, i64)>;

    /// Smallest and largest ID present, `(0, 0)` for an empty stream.
    fn min_max_id(&self, stream: &str) -> Result<(i64, i64)>;

    /// ID of the `count`-th newest message, or of the oldest message when the
    /// stream holds fewer than `count`. `None` for an empty stream or `count == 0`.
    fn newest_window_start(&self, stream: &str, count: usize) -> Result<Option<i64>>;

    /// Delete at most `limit` messages with ID below `boundary`, oldest first.
    /// Returns the number removed.
    fn delete_before(&self, stream: &str, boundary: i64, limit: usize) -> Result<usize>;
}

/// Reject names that cannot address a stream.
pub fn validate_stream_name(stream: &str) -> Result<()> {
    if stream.trim().is_empty() {
        return Err(BusError::InvalidStreamName(stream.to_string()));
    }
    Ok(())
}

/// Backing table name for a stream.
///
/// Characters outside `[A-Za-z0-9_]` map to `_`, so distinct stream names
/// may share a table.
pub fn stream_table_name(stream: &str) -> String {
    let sanitized: String = stream
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{}{}", STREAM_TABLE_PREFIX, sanitized)
}
