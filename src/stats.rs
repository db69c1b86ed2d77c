//! Bus statistics.
//!
//! A `Stats` instance is created by whoever builds the hub and shared with
//! every stream and poll worker, so counters stay local to one hub.

use crate::error::Result;
use crate::subscriptions::WorkerState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process counters for one hub.
#[derive(Debug, Default)]
pub struct Stats {
    messages_published: AtomicU64,
    batches_written: AtomicU64,
    batch_write_failures: AtomicU64,
    messages_failed: AtomicU64,
    messages_polled: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
    gc_runs: AtomicU64,
    messages_reclaimed: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_published: u64,
    pub batches_written: u64,
    pub batch_write_failures: u64,
    pub messages_failed: u64,
    pub messages_polled: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub gc_runs: u64,
    pub messages_reclaimed: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_batch_written(&self, messages: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.messages_published
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_failed(&self, messages: usize) {
        self.batch_write_failures.fetch_add(1, Ordering::Relaxed);
        self.messages_failed
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_polled(&self, messages: usize) {
        self.messages_polled
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, messages: u64) {
        self.messages_delivered.fetch_add(messages, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, messages: u64) {
        self.messages_dropped.fetch_add(messages, Ordering::Relaxed);
    }

    pub(crate) fn record_gc(&self, deleted: u64) {
        self.gc_runs.fetch_add(1, Ordering::Relaxed);
        self.messages_reclaimed.fetch_add(deleted, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batch_write_failures: self.batch_write_failures.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            messages_polled: self.messages_polled.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            gc_runs: self.gc_runs.load(Ordering::Relaxed),
            messages_reclaimed: self.messages_reclaimed.load(Ordering::Relaxed),
        }
    }

    /// Render the current counters as a JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}

/// Poll worker view inside a [`StreamStat`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStat {
    pub last_poll_id: i64,
    pub poll_interval_ms: u64,
    pub poll_batch_size: usize,
    pub subscribers: usize,
    pub state: WorkerState,
}

/// Inspection result for one stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStat {
    pub stream: String,
    pub min_id: i64,
    pub max_id: i64,
    /// Whether this hub has an open publisher for the stream.
    pub publishing: bool,
    pub worker: Option<WorkerStat>,
}
