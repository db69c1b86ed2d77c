//! In-process store with fault injection.

use super::{validate_stream_name, Store};
use crate::error::{BusError, Result};
use crate::types::{Message, MessageInput, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One stream's log.
#[derive(Default)]
struct MemoryLog {
    /// Last ID handed out; never decreases, even when messages are deleted.
    last_id: i64,
    messages: BTreeMap<i64, Message>,
}

/// In-memory implementation of [`Store`].
///
/// Follows the same contract as the SQL store, including never reusing IDs,
/// and can be told to fail so error paths can be exercised:
/// - `fail_next_puts(n)`: the next `n` batch writes fail without side effects
/// - `fail_next_fetches(n)`: the next `n` fetches fail
/// - `set_unavailable(true)`: every call fails until switched back
#[derive(Default)]
pub struct MemoryStore {
    logs: RwLock<HashMap<String, MemoryLog>>,
    failing_puts: AtomicUsize,
    failing_fetches: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_fetches(&self, n: usize) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of messages currently held for `stream`.
    pub fn len(&self, stream: &str) -> usize {
        self.logs
            .read()
            .get(stream)
            .map(|log| log.messages.len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::StoreUnavailable("store is offline".into()));
        }
        Ok(())
    }

    /// Consume one injected failure from `counter`, if any are pending.
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn missing(stream: &str) -> BusError {
        BusError::StreamNotFound(stream.to_string())
    }
}

impl Store for MemoryStore {
    fn create_stream(&self, stream: &str) -> Result<()> {
        validate_stream_name(stream)?;
        self.check_available()?;
        self.logs.write().entry(stream.to_string()).or_default();
        Ok(())
    }

    fn stream_exists(&self, stream: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.logs.read().contains_key(stream))
    }

    fn list_streams(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let mut names: Vec<String> = self.logs.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn put_messages(&self, stream: &str, batch: &[MessageInput]) -> Result<Vec<Message>> {
        self.check_available()?;
        if Self::take_failure(&self.failing_puts) {
            return Err(BusError::StoreUnavailable("injected write failure".into()));
        }

        let mut logs = self.logs.write();
        let log = logs.get_mut(stream).ok_or_else(|| Self::missing(stream))?;

        // Everything is assigned under one write lock, so the batch becomes
        // visible all at once.
        let mut written = Vec::with_capacity(batch.len());
        for input in batch {
            log.last_id += 1;
            let message = Message {
                id: log.last_id,
                ts: input.ts.unwrap_or_else(Timestamp::now),
                data: input.data.clone(),
            };
            log.messages.insert(message.id, message.clone());
            written.push(message);
        }
        Ok(written)
    }

    fn fetch_messages(
        &self,
        stream: &str,
        after: i64,
        limit: usize,
    ) -> Result<(Vec<Message>, i64)> {
        self.check_available()?;
        if Self::take_failure(&self.failing_fetches) {
            return Err(BusError::StoreUnavailable("injected fetch failure".into()));
        }

        let logs = self.logs.read();
        let log = logs.get(stream).ok_or_else(|| Self::missing(stream))?;
        let messages: Vec<Message> = log
            .messages
            .range(after.saturating_add(1)..)
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect();
        let max = messages.last().map(|m| m.id).unwrap_or(0);
        Ok((messages, max))
    }

    fn min_max_id(&self, stream: &str) -> Result<(i64, i64)> {
        self.check_available()?;
        let logs = self.logs.read();
        let log = logs.get(stream).ok_or_else(|| Self::missing(stream))?;
        let min = log.messages.keys().next().copied().unwrap_or(0);
        let max = log.messages.keys().next_back().copied().unwrap_or(0);
        Ok((min, max))
    }

    fn newest_window_start(&self, stream: &str, count: usize) -> Result<Option<i64>> {
        self.check_available()?;
        if count == 0 {
            return Ok(None);
        }
        let logs = self.logs.read();
        let log = logs.get(stream).ok_or_else(|| Self::missing(stream))?;
        Ok(log.messages.keys().rev().take(count).last().copied())
    }

    fn delete_before(&self, stream: &str, boundary: i64, limit: usize) -> Result<usize> {
        self.check_available()?;
        let mut logs = self.logs.write();
        let log = logs.get_mut(stream).ok_or_else(|| Self::missing(stream))?;
        let doomed: Vec<i64> = log
            .messages
            .range(..boundary)
            .take(limit)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            log.messages.remove(id);
        }
        Ok(doomed.len())
    }
}
