//! Count-based reclamation of old messages.
//!
//! Retention is a number of most-recent messages, not a time window. The
//! safe boundary is the ID of the message `keep` positions back from the
//! newest one; everything below it may be deleted. Deletion runs in bounded
//! chunks until a chunk removes nothing, which caps the cost and lock scope
//! of each delete statement no matter how much backlog has built up.

use crate::error::Result;
use crate::stats::Stats;
use crate::store::Store;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one reclamation pass over a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcResult {
    /// Messages with an ID below this were eligible; `None` means nothing was.
    pub boundary: Option<i64>,
    /// Messages actually removed.
    pub deleted: u64,
}

/// Deletes messages older than the retention window.
pub struct GcWorker {
    store: Arc<dyn Store>,
    stats: Arc<Stats>,
    keep: usize,
    chunk_size: usize,
}

impl GcWorker {
    /// `keep` most-recent messages always survive; deletes remove at most
    /// `chunk_size` rows each.
    pub fn new(store: Arc<dyn Store>, stats: Arc<Stats>, keep: usize, chunk_size: usize) -> Self {
        Self {
            store,
            stats,
            keep,
            chunk_size: chunk_size.max(1),
        }
    }

    /// ID below which deletion keeps the newest `keep` messages.
    ///
    /// With fewer than `keep` messages the boundary is the oldest ID, so
    /// nothing is deleted. A retention of zero allows deleting everything.
    pub fn safe_offset(&self, stream: &str) -> Result<Option<i64>> {
        if self.keep == 0 {
            let (_, max) = self.store.min_max_id(stream)?;
            return Ok((max > 0).then_some(max + 1));
        }
        self.store.newest_window_start(stream, self.keep)
    }

    /// Delete every message with ID below `boundary`, one bounded chunk at a time.
    pub fn delete_until(&self, stream: &str, boundary: i64) -> Result<u64> {
        let mut total = 0u64;
        loop {
            let deleted = self.store.delete_before(stream, boundary, self.chunk_size)?;
            if deleted == 0 {
                break;
            }
            total += deleted as u64;
            debug!(stream = %stream, deleted, boundary, "reclaimed chunk");
        }
        Ok(total)
    }

    /// Compute the safe boundary and delete everything below it.
    pub fn safe_gc(&self, stream: &str) -> Result<GcResult> {
        let boundary = self.safe_offset(stream)?;
        let deleted = match boundary {
            Some(boundary) => self.delete_until(stream, boundary)?,
            None => 0,
        };
        self.stats.record_gc(deleted);
        Ok(GcResult { boundary, deleted })
    }
}
