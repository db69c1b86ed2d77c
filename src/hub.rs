//! The hub: process-wide registry of publishers and poll workers.
//!
//! Streams and poll workers are created lazily on first publish or
//! subscribe and live until [`Hub::shutdown`]. One background thread runs
//! reclamation over every stream the hub has seen.

use crate::config::HubConfig;
use crate::error::{BusError, Result};
use crate::gc::{GcResult, GcWorker};
use crate::stats::{Stats, StatsSnapshot, StreamStat};
use crate::store::{validate_stream_name, SqliteStore, Store};
use crate::stream::Stream;
use crate::subscriptions::{PollWorker, Subscription};
use crate::types::{Message, MessageInput, Offset, SubscriberId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Default)]
struct Registry {
    streams: HashMap<String, Arc<Stream>>,
    workers: HashMap<String, Arc<PollWorker>>,
}

impl Registry {
    /// Every stream name with a publisher or a poll worker, sorted.
    fn known(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.streams.keys().chain(self.workers.keys()).collect();
        names.into_iter().cloned().collect()
    }
}

/// Message bus over a [`Store`].
pub struct Hub {
    config: HubConfig,
    store: Arc<dyn Store>,
    stats: Arc<Stats>,
    gc: Arc<GcWorker>,
    registry: Arc<RwLock<Registry>>,
    closed: AtomicBool,
    gc_stop: Mutex<Option<Sender<()>>>,
    gc_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Open the SQLite store named by `config.dsn` and start the hub.
    pub fn open(config: HubConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.dsn)?;
        Self::with_store(config, Arc::new(store), Arc::new(Stats::new()))
    }

    /// Start a hub over an existing store, sharing `stats` with the caller.
    pub fn with_store(config: HubConfig, store: Arc<dyn Store>, stats: Arc<Stats>) -> Result<Self> {
        config.validate()?;
        let gc = Arc::new(GcWorker::new(
            Arc::clone(&store),
            Arc::clone(&stats),
            config.gc_keep_items,
            config.max_batch_size,
        ));
        let registry = Arc::new(RwLock::new(Registry::default()));

        let (gc_stop, stopped) = bounded(0);
        let loop_gc = Arc::clone(&gc);
        let loop_registry = Arc::clone(&registry);
        let interval = config.gc_interval();
        let gc_handle = thread::Builder::new()
            .name("tablebus-gc".into())
            .spawn(move || run_gc(loop_gc, loop_registry, interval, stopped))?;

        info!(
            poll_interval_ms = config.poll_interval_ms,
            max_batch_size = config.max_batch_size,
            gc_keep_items = config.gc_keep_items,
            "hub started"
        );
        Ok(Self {
            config,
            store,
            stats,
            gc,
            registry,
            closed: AtomicBool::new(false),
            gc_stop: Mutex::new(Some(gc_stop)),
            gc_handle: Mutex::new(Some(gc_handle)),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Queue a message on `stream`, opening the stream on first use.
    ///
    /// Returns once the message is queued; see [`Hub::publish_durable`] to
    /// wait for the write.
    pub fn publish(&self, stream: &str, input: MessageInput) -> Result<()> {
        self.stream(stream)?.publish(input)
    }

    /// Publish and block until the message is committed, returning it with its ID.
    pub fn publish_durable(&self, stream: &str, input: MessageInput) -> Result<Message> {
        self.stream(stream)?.publish_durable(input)
    }

    /// Register `id` on `stream` and return its channel.
    ///
    /// The first subscribe on a stream starts its poll worker at `offset`.
    /// Later subscribers with an older offset are replayed from the store.
    pub fn subscribe(
        &self,
        stream: &str,
        id: impl Into<SubscriberId>,
        offset: Offset,
    ) -> Result<Subscription> {
        self.worker(stream, offset)?.add_subscriber(id.into(), offset)
    }

    /// Like [`Hub::subscribe`] with a specific channel capacity.
    pub fn subscribe_with_capacity(
        &self,
        stream: &str,
        id: impl Into<SubscriberId>,
        offset: Offset,
        capacity: usize,
    ) -> Result<Subscription> {
        self.worker(stream, offset)?
            .add_subscriber_with_capacity(id.into(), offset, capacity)
    }

    /// Remove a subscriber and close its channel. No-op for unknown streams.
    pub fn unsubscribe(&self, stream: &str, id: &SubscriberId) -> bool {
        let worker = self.registry.read().workers.get(stream).cloned();
        worker.map(|w| w.remove_subscriber(id)).unwrap_or(false)
    }

    /// Every stored message after `offset`, read straight from the store.
    pub fn messages_since_offset(&self, stream: &str, offset: Offset) -> Result<Vec<Message>> {
        self.ensure_known(stream)?;
        let mut cursor = if offset.is_latest() {
            self.store.min_max_id(stream)?.1
        } else if offset.0 < 0 {
            return Err(BusError::InvalidOffset(offset.0));
        } else {
            offset.0
        };

        let mut out = Vec::new();
        loop {
            let (messages, max) = self
                .store
                .fetch_messages(stream, cursor, self.config.max_batch_size)?;
            if messages.is_empty() {
                break;
            }
            out.extend(messages);
            cursor = max;
        }
        Ok(out)
    }

    pub fn min_max_id(&self, stream: &str) -> Result<(i64, i64)> {
        self.ensure_known(stream)?;
        self.store.min_max_id(stream)
    }

    pub fn stat(&self, stream: &str) -> Result<StreamStat> {
        self.ensure_known(stream)?;
        let (min_id, max_id) = self.store.min_max_id(stream)?;
        let (publishing, worker) = {
            let registry = self.registry.read();
            (
                registry.streams.contains_key(stream),
                registry.workers.get(stream).cloned(),
            )
        };
        Ok(StreamStat {
            stream: stream.to_string(),
            min_id,
            max_id,
            publishing,
            worker: worker.map(|w| w.stat()),
        })
    }

    /// Streams known to this hub or recorded by the store.
    pub fn streams(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.store.list_streams()?.into_iter().collect();
        names.extend(self.registry.read().known());
        Ok(names.into_iter().collect())
    }

    /// Run reclamation over every stream the hub has seen, now.
    ///
    /// A failing stream does not stop the pass; each stream gets its own result.
    pub fn force_gc(&self) -> Vec<(String, Result<GcResult>)> {
        let names = self.registry.read().known();
        names
            .into_iter()
            .map(|name| {
                let result = self.gc.safe_gc(&name);
                if let Err(e) = &result {
                    error!(stream = %name, error = %e, "forced gc failed");
                }
                (name, result)
            })
            .collect()
    }

    /// Run reclamation over one stream, now.
    pub fn force_gc_stream(&self, stream: &str) -> Result<GcResult> {
        if !self.store.stream_exists(stream)? {
            return Err(BusError::StreamNotFound(stream.to_string()));
        }
        self.gc.safe_gc(stream)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flush and close every stream, stop every poll worker and the GC loop.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let (streams, workers) = {
            let mut registry = self.registry.write();
            (
                std::mem::take(&mut registry.streams),
                std::mem::take(&mut registry.workers),
            )
        };
        for stream in streams.values() {
            stream.close();
        }
        for worker in workers.values() {
            worker.stop();
        }

        self.gc_stop.lock().take();
        if let Some(handle) = self.gc_handle.lock().take() {
            if handle.join().is_err() {
                error!("gc loop panicked");
            }
        }
        info!("hub stopped");
    }

    fn stream(&self, name: &str) -> Result<Arc<Stream>> {
        if let Some(stream) = self.registry.read().streams.get(name) {
            return Ok(Arc::clone(stream));
        }

        let mut registry = self.registry.write();
        // Re-check: another caller may have opened it meanwhile.
        if let Some(stream) = registry.streams.get(name) {
            return Ok(Arc::clone(stream));
        }
        self.check_open(name)?;
        let stream = Arc::new(Stream::open(
            name,
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            &self.config,
        )?);
        registry.streams.insert(name.to_string(), Arc::clone(&stream));
        Ok(stream)
    }

    fn worker(&self, name: &str, offset: Offset) -> Result<Arc<PollWorker>> {
        if let Some(worker) = self.registry.read().workers.get(name) {
            return Ok(Arc::clone(worker));
        }

        let mut registry = self.registry.write();
        if let Some(worker) = registry.workers.get(name) {
            return Ok(Arc::clone(worker));
        }
        self.check_open(name)?;
        validate_stream_name(name)?;
        let worker = Arc::new(PollWorker::start(
            name,
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            &self.config,
            offset,
        )?);
        info!(stream = %name, watermark = worker.watermark(), "started poll worker");
        registry.workers.insert(name.to_string(), Arc::clone(&worker));
        Ok(worker)
    }

    fn check_open(&self, name: &str) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::StreamClosed(name.to_string()));
        }
        Ok(())
    }

    /// Admin calls on a stream neither this hub nor the store knows are errors.
    fn ensure_known(&self, stream: &str) -> Result<()> {
        {
            let registry = self.registry.read();
            if registry.streams.contains_key(stream) || registry.workers.contains_key(stream) {
                return Ok(());
            }
        }
        if self.store.stream_exists(stream)? {
            Ok(())
        } else {
            Err(BusError::StreamNotFound(stream.to_string()))
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodic reclamation over the streams in `registry`.
fn run_gc(
    gc: Arc<GcWorker>,
    registry: Arc<RwLock<Registry>>,
    interval: Duration,
    stopped: Receiver<()>,
) {
    while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
        let names = registry.read().known();
        for name in names {
            match gc.safe_gc(&name) {
                Ok(result) => debug!(
                    stream = %name,
                    deleted = result.deleted,
                    boundary = ?result.boundary,
                    "gc pass"
                ),
                Err(e) => error!(stream = %name, error = %e, "gc failed"),
            }
        }
    }
}
