//! Publish side of a stream: coalesces publish calls into batched writes.
//!
//! Publishers enqueue onto a bounded channel and return as soon as the
//! message is queued; a full queue is the only thing that blocks them. A
//! dedicated thread drains the queue into batches that close when they reach
//! `max_batch_size` or when `flush_timeout` has passed since the batch's
//! first message, and writes each batch as one store transaction.

use crate::config::HubConfig;
use crate::error::{BusError, Result};
use crate::stats::Stats;
use crate::store::{validate_stream_name, Store};
use crate::types::{Message, MessageInput};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Acknowledgement channel for a durable publish.
type Ack = Sender<Result<Message>>;

/// A queued message waiting for its batch.
struct Pending {
    input: MessageInput,
    ack: Option<Ack>,
}

/// Publisher for one stream.
///
/// Only handed out after [`Stream::open`] has created the backing log and
/// started the batching thread.
pub struct Stream {
    name: String,
    store: Arc<dyn Store>,
    sender: RwLock<Option<Sender<Pending>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Stream {
    /// Create the stream's log if needed, then start the batching thread.
    ///
    /// Nothing is left running when this fails.
    pub fn open(
        name: &str,
        store: Arc<dyn Store>,
        stats: Arc<Stats>,
        config: &HubConfig,
    ) -> Result<Self> {
        validate_stream_name(name)?;
        store.create_stream(name)?;

        let (sender, receiver) = bounded(config.max_batch_size);
        let writer = BatchWriter {
            stream: name.to_string(),
            store: Arc::clone(&store),
            stats,
            max_batch_size: config.max_batch_size,
            flush_timeout: config.flush_timeout(),
            retries: config.publish_retries,
            retry_backoff: config.publish_retry_backoff(),
        };
        let handle = thread::Builder::new()
            .name(format!("tablebus-pub-{}", name))
            .spawn(move || writer.run(receiver))?;

        info!(stream = %name, "opened stream for publishing");
        Ok(Self {
            name: name.to_string(),
            store,
            sender: RwLock::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a message for the next batch.
    ///
    /// Stamps the current time if the message has none. Returning `Ok` means
    /// the message is queued, not that it is durable.
    pub fn publish(&self, mut input: MessageInput) -> Result<()> {
        input.stamp();
        self.enqueue(Pending { input, ack: None })
    }

    /// Queue a message and wait until the batch carrying it is committed.
    pub fn publish_durable(&self, mut input: MessageInput) -> Result<Message> {
        input.stamp();
        let (ack, done) = bounded(1);
        self.enqueue(Pending {
            input,
            ack: Some(ack),
        })?;
        done.recv()
            .map_err(|_| BusError::StreamClosed(self.name.clone()))?
    }

    /// Messages queued but not yet picked up by the batching thread.
    pub fn queued(&self) -> usize {
        self.sender.read().as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn min_max_id(&self) -> Result<(i64, i64)> {
        self.store.min_max_id(&self.name)
    }

    /// Stop accepting messages, flush what is queued and join the batching thread.
    pub fn close(&self) {
        // Dropping the last sender lets the writer drain and exit.
        if self.sender.write().take().is_none() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(stream = %self.name, "batch writer panicked");
            }
        }
        info!(stream = %self.name, "closed stream");
    }

    fn enqueue(&self, pending: Pending) -> Result<()> {
        // Clone so a publisher blocked on a full queue does not hold the lock.
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or_else(|| BusError::StreamClosed(self.name.clone()))?;
        sender
            .send(pending)
            .map_err(|_| BusError::StreamClosed(self.name.clone()))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

/// The batching loop run on the stream's thread.
struct BatchWriter {
    stream: String,
    store: Arc<dyn Store>,
    stats: Arc<Stats>,
    max_batch_size: usize,
    flush_timeout: Duration,
    retries: u32,
    retry_backoff: Duration,
}

impl BatchWriter {
    fn run(self, queue: Receiver<Pending>) {
        debug!(stream = %self.stream, "batch writer started");
        // Block for the first message; an idle stream never writes.
        while let Ok(first) = queue.recv() {
            let deadline = Instant::now() + self.flush_timeout;
            let mut batch = Vec::with_capacity(self.max_batch_size);
            batch.push(first);
            while batch.len() < self.max_batch_size {
                match queue.recv_deadline(deadline) {
                    Ok(pending) => batch.push(pending),
                    // Timed out, or closed and drained.
                    Err(_) => break,
                }
            }
            self.write_batch(batch);
        }
        debug!(stream = %self.stream, "batch writer stopped");
    }

    fn write_batch(&self, batch: Vec<Pending>) {
        let count = batch.len();
        let (inputs, acks): (Vec<MessageInput>, Vec<Option<Ack>>) =
            batch.into_iter().map(|p| (p.input, p.ack)).unzip();

        let mut attempt = 0u32;
        loop {
            match self.store.put_messages(&self.stream, &inputs) {
                Ok(written) => {
                    self.stats.record_batch_written(count);
                    debug!(
                        stream = %self.stream,
                        count,
                        last_id = written.last().map(|m| m.id).unwrap_or(0),
                        "wrote batch"
                    );
                    for (ack, message) in acks.into_iter().zip(written) {
                        if let Some(ack) = ack {
                            let _ = ack.send(Ok(message));
                        }
                    }
                    return;
                }
                Err(e) if attempt < self.retries => {
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        stream = %self.stream,
                        count,
                        attempt,
                        error = %e,
                        "batch write failed, retrying in {:?}",
                        delay
                    );
                    thread::sleep(delay);
                }
                Err(e) => {
                    error!(
                        stream = %self.stream,
                        count,
                        error = %e,
                        "batch write failed, dropping batch"
                    );
                    self.stats.record_batch_failed(count);
                    let reason = e.to_string();
                    for ack in acks.into_iter().flatten() {
                        let _ = ack.send(Err(BusError::PublishFailed {
                            stream: self.stream.clone(),
                            reason: reason.clone(),
                        }));
                    }
                    return;
                }
            }
        }
    }
}
