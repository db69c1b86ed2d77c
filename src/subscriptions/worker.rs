//! Poll worker: watermark-driven polling and non-blocking fan-out.

use crate::config::HubConfig;
use crate::error::{BusError, Result};
use crate::stats::{Stats, WorkerStat};
use crate::store::Store;
use crate::types::{Message, Offset, SubscriberId};
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::types::{Subscription, WorkerState};

/// Longest a catch-up send blocks before re-checking for cancellation.
const CATCH_UP_SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// Cap on the pause after a failed catch-up fetch.
const CATCH_UP_RETRY_LIMIT: Duration = Duration::from_secs(1);

/// Internal subscriber state.
struct Subscriber {
    sender: Sender<Message>,
    /// Only messages with a larger ID are delivered.
    floor: i64,
    /// Messages discarded because the buffer was full.
    dropped: u64,
    /// Present while a catch-up thread still owns delivery; live fan-out skips
    /// the subscriber until it is cleared.
    catch_up: Option<Arc<AtomicBool>>,
}

/// Result of delivering one batch to one subscriber.
#[derive(Default)]
struct Delivery {
    delivered: u64,
    dropped: u64,
    disconnected: bool,
}

impl Subscriber {
    /// Try to send each message. Never blocks; a full buffer drops the message.
    fn deliver(&mut self, messages: &[Message]) -> Delivery {
        let mut outcome = Delivery::default();
        for message in messages.iter().filter(|m| m.id > self.floor) {
            match self.sender.try_send(message.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => outcome.dropped += 1,
                Err(TrySendError::Disconnected(_)) => {
                    outcome.disconnected = true;
                    break;
                }
            }
        }
        self.dropped += outcome.dropped;
        outcome
    }

    fn is_live(&self) -> bool {
        self.catch_up.is_none()
    }

    fn caught_up_by(&self, cancel: &Arc<AtomicBool>) -> bool {
        self.catch_up
            .as_ref()
            .map_or(false, |own| Arc::ptr_eq(own, cancel))
    }

    fn cancel_catch_up(&self) {
        if let Some(cancel) = &self.catch_up {
            cancel.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.cancel_catch_up();
    }
}

/// State shared by the fan-out and subscriber registration.
struct FanOut {
    /// Highest ID already handed to the fan-out set.
    watermark: i64,
    subscribers: HashMap<SubscriberId, Subscriber>,
}

struct Shared {
    stream: String,
    store: Arc<dyn Store>,
    stats: Arc<Stats>,
    batch_size: usize,
    buffer_size: usize,
    poll_interval: Duration,
    state: AtomicU8,
    /// Serializes whole fetch-then-fan-out cycles.
    poll_lock: Mutex<()>,
    fanout: Mutex<FanOut>,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Fetch past the watermark and fan the batch out.
    ///
    /// On a fetch error the watermark stays where it was.
    fn poll_once(&self) -> Result<usize> {
        let _cycle = self.poll_lock.lock();
        let after = self.fanout.lock().watermark;
        let (messages, max) = self
            .store
            .fetch_messages(&self.stream, after, self.batch_size)?;
        if messages.is_empty() {
            return Ok(0);
        }
        self.stats.record_polled(messages.len());

        let mut fanout = self.fanout.lock();
        fanout.watermark = max;
        debug!(
            stream = %self.stream,
            count = messages.len(),
            watermark = max,
            "polled messages"
        );

        let mut gone = Vec::new();
        for (id, subscriber) in fanout.subscribers.iter_mut().filter(|(_, s)| s.is_live()) {
            let outcome = subscriber.deliver(&messages);
            self.account(id, &outcome);
            if outcome.disconnected {
                gone.push(id.clone());
            }
        }
        for id in gone {
            fanout.subscribers.remove(&id);
            info!(stream = %self.stream, subscriber = %id, "removed disconnected subscriber");
        }
        Ok(messages.len())
    }

    /// Send one page of `(cursor, until]` to a catching-up subscriber.
    ///
    /// Sends block until the consumer makes room. Returns the new cursor, or
    /// `None` once the subscriber is cancelled or its receiver is gone.
    fn replay_page(
        &self,
        sender: &Sender<Message>,
        cancel: &AtomicBool,
        cursor: i64,
        until: i64,
    ) -> Result<Option<i64>> {
        let (messages, _) = self
            .store
            .fetch_messages(&self.stream, cursor, self.batch_size)?;
        let end = messages.partition_point(|m| m.id <= until);
        if end == 0 {
            // Nothing left at or below `until`, e.g. reclaimed meanwhile.
            return Ok(Some(until));
        }

        let mut next = cursor;
        for message in &messages[..end] {
            let mut pending = message.clone();
            loop {
                if cancel.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                match sender.send_timeout(pending, CATCH_UP_SEND_TIMEOUT) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(message)) => pending = message,
                    Err(SendTimeoutError::Disconnected(_)) => return Ok(None),
                }
            }
            self.stats.record_delivered(1);
            next = message.id;
        }
        Ok(Some(next))
    }

    /// Drop a catching-up subscriber whose consumer went away.
    fn forget(&self, id: &SubscriberId, cancel: &Arc<AtomicBool>) {
        let mut fanout = self.fanout.lock();
        if fanout
            .subscribers
            .get(id)
            .map_or(false, |s| s.caught_up_by(cancel))
        {
            fanout.subscribers.remove(id);
            info!(stream = %self.stream, subscriber = %id, "removed disconnected subscriber");
        }
    }

    fn account(&self, id: &SubscriberId, outcome: &Delivery) {
        self.stats.record_delivered(outcome.delivered);
        if outcome.dropped > 0 {
            self.stats.record_dropped(outcome.dropped);
            warn!(
                stream = %self.stream,
                subscriber = %id,
                dropped = outcome.dropped,
                "subscriber buffer full, dropping messages"
            );
        }
    }
}

/// Polls one stream and fans new messages out to its subscribers.
pub struct PollWorker {
    shared: Arc<Shared>,
    stop_signal: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollWorker {
    /// Resolve the starting watermark and start polling.
    ///
    /// `Offset::LATEST` starts at the current newest ID so backlog is skipped.
    /// Nothing is left running when this fails.
    pub fn start(
        stream: &str,
        store: Arc<dyn Store>,
        stats: Arc<Stats>,
        config: &HubConfig,
        offset: Offset,
    ) -> Result<Self> {
        check_offset(offset)?;
        store.create_stream(stream)?;
        let watermark = if offset.is_latest() {
            store.min_max_id(stream)?.1
        } else {
            offset.0
        };

        let shared = Arc::new(Shared {
            stream: stream.to_string(),
            store,
            stats,
            batch_size: config.max_batch_size,
            buffer_size: config.subscriber_buffer_size,
            poll_interval: config.poll_interval(),
            state: AtomicU8::new(WorkerState::Initializing.as_u8()),
            poll_lock: Mutex::new(()),
            fanout: Mutex::new(FanOut {
                watermark,
                subscribers: HashMap::new(),
            }),
        });

        let (stop_signal, stopped) = bounded(0);
        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("tablebus-poll-{}", stream))
            .spawn(move || run(loop_shared, stopped))?;

        Ok(Self {
            shared,
            stop_signal: Mutex::new(Some(stop_signal)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn stream(&self) -> &str {
        &self.shared.stream
    }

    /// Register a subscriber with the default buffer size.
    pub fn add_subscriber(&self, id: SubscriberId, offset: Offset) -> Result<Subscription> {
        self.add_subscriber_with_capacity(id, offset, self.shared.buffer_size)
    }

    /// Register a subscriber and return its channel.
    ///
    /// `Offset::LATEST` starts after the newest stored message, even when the
    /// worker itself is still behind. An older `offset` is replayed from the
    /// store by a short-lived thread that feeds the channel as the consumer
    /// drains it, then joins the live set with no gap or duplicate.
    /// Re-using an id replaces the previous registration and closes its channel.
    pub fn add_subscriber_with_capacity(
        &self,
        id: SubscriberId,
        offset: Offset,
        capacity: usize,
    ) -> Result<Subscription> {
        check_offset(offset)?;
        let tail = if offset.is_latest() {
            Some(self.shared.store.min_max_id(&self.shared.stream)?.1)
        } else {
            None
        };
        let (sender, receiver) = bounded(capacity.max(1));

        let mut fanout = self.shared.fanout.lock();
        let watermark = fanout.watermark;
        let floor = match tail {
            Some(tail) => tail.max(watermark),
            None => offset.0,
        };
        let catch_up = (floor < watermark).then(|| Arc::new(AtomicBool::new(false)));
        let subscriber = Subscriber {
            sender: sender.clone(),
            floor,
            dropped: 0,
            catch_up: catch_up.clone(),
        };

        if fanout.subscribers.insert(id.clone(), subscriber).is_some() {
            info!(stream = %self.shared.stream, subscriber = %id, "replaced subscriber");
        } else {
            info!(stream = %self.shared.stream, subscriber = %id, offset = %offset, "added subscriber");
        }

        if let Some(cancel) = catch_up {
            let shared = Arc::clone(&self.shared);
            let replay_id = id.clone();
            let spawned = thread::Builder::new()
                .name(format!("tablebus-catchup-{}", self.shared.stream))
                .spawn(move || run_catch_up(shared, replay_id, sender, cancel, floor));
            if let Err(e) = spawned {
                fanout.subscribers.remove(&id);
                return Err(e.into());
            }
        }

        Ok(Subscription {
            id,
            stream: self.shared.stream.clone(),
            receiver,
        })
    }

    /// Remove a subscriber, closing its channel. Returns whether it existed.
    pub fn remove_subscriber(&self, id: &SubscriberId) -> bool {
        let removed = self.shared.fanout.lock().subscribers.remove(id).is_some();
        if removed {
            info!(stream = %self.shared.stream, subscriber = %id, "removed subscriber");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.fanout.lock().subscribers.len()
    }

    /// Messages dropped for `id` because its buffer was full.
    pub fn dropped_for(&self, id: &SubscriberId) -> Option<u64> {
        self.shared
            .fanout
            .lock()
            .subscribers
            .get(id)
            .map(|s| s.dropped)
    }

    /// Highest ID delivered through the live path.
    pub fn watermark(&self) -> i64 {
        self.shared.fanout.lock().watermark
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Run one poll cycle now, outside the regular cadence.
    pub fn poll_now(&self) -> Result<usize> {
        if self.state() == WorkerState::Stopped {
            return Err(BusError::StreamClosed(self.shared.stream.clone()));
        }
        self.shared.poll_once()
    }

    pub fn stat(&self) -> WorkerStat {
        let (watermark, subscribers) = {
            let fanout = self.shared.fanout.lock();
            (fanout.watermark, fanout.subscribers.len())
        };
        WorkerStat {
            last_poll_id: watermark,
            poll_interval_ms: self.shared.poll_interval.as_millis() as u64,
            poll_batch_size: self.shared.batch_size,
            subscribers,
            state: self.state(),
        }
    }

    /// Stop polling and join the loop. Registered channels stay open.
    pub fn stop(&self) {
        // Dropping the signal sender wakes the loop out of its interval wait.
        if self.stop_signal.lock().take().is_none() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(stream = %self.shared.stream, "poll loop panicked");
            }
        }
        self.shared.set_state(WorkerState::Stopped);
        for subscriber in self.shared.fanout.lock().subscribers.values() {
            subscriber.cancel_catch_up();
        }
        info!(stream = %self.shared.stream, "poll worker stopped");
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_offset(offset: Offset) -> Result<()> {
    if offset.0 < 0 && !offset.is_latest() {
        return Err(BusError::InvalidOffset(offset.0));
    }
    Ok(())
}

/// The poll loop run on the worker's thread.
fn run(shared: Arc<Shared>, stopped: Receiver<()>) {
    shared.set_state(WorkerState::Running);
    info!(
        stream = %shared.stream,
        watermark = shared.fanout.lock().watermark,
        "start polling"
    );
    // Wait first: a stop signal or a closed channel ends the loop.
    while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(shared.poll_interval) {
        if let Err(e) = shared.poll_once() {
            error!(stream = %shared.stream, error = %e, "poll failed");
        }
    }
    shared.set_state(WorkerState::Stopped);
}

/// Replay `(from, watermark]` to one subscriber, chasing the watermark until
/// it can join the live set.
fn run_catch_up(
    shared: Arc<Shared>,
    id: SubscriberId,
    sender: Sender<Message>,
    cancel: Arc<AtomicBool>,
    from: i64,
) {
    let mut cursor = from;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let target = {
            let mut fanout = shared.fanout.lock();
            let watermark = fanout.watermark;
            if cursor >= watermark {
                // Joining under the fan-out lock: the next live batch starts
                // right after `watermark`.
                if let Some(subscriber) = fanout.subscribers.get_mut(&id) {
                    if subscriber.caught_up_by(&cancel) {
                        subscriber.floor = subscriber.floor.max(cursor);
                        subscriber.catch_up = None;
                        debug!(
                            stream = %shared.stream,
                            subscriber = %id,
                            from,
                            until = cursor,
                            "caught up"
                        );
                    }
                }
                return;
            }
            watermark
        };

        match shared.replay_page(&sender, &cancel, cursor, target) {
            Ok(Some(next)) => cursor = next,
            Ok(None) => {
                shared.forget(&id, &cancel);
                return;
            }
            Err(e) => {
                warn!(
                    stream = %shared.stream,
                    subscriber = %id,
                    error = %e,
                    "catch-up fetch failed"
                );
                thread::sleep(shared.poll_interval.min(CATCH_UP_RETRY_LIMIT));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::MessageInput;

    const WAIT: Duration = Duration::from_secs(2);

    fn config(poll_interval_ms: u64, subscriber_buffer_size: usize) -> HubConfig {
        HubConfig {
            dsn: ":memory:".into(),
            max_batch_size: 3,
            poll_interval_ms,
            subscriber_buffer_size,
            ..Default::default()
        }
    }

    fn publish(store: &MemoryStore, payloads: &[&str]) -> Vec<Message> {
        let batch: Vec<MessageInput> = payloads.iter().map(|p| MessageInput::new(*p)).collect();
        store.put_messages("s", &batch).unwrap()
    }

    fn setup() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_stream("s").unwrap();
        store
    }

    fn start(store: &Arc<MemoryStore>, config: &HubConfig, offset: Offset) -> PollWorker {
        PollWorker::start("s", store.clone(), Arc::new(Stats::new()), config, offset).unwrap()
    }

    fn drain(sub: &Subscription) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Ok(message) = sub.recv_timeout(Duration::from_millis(50)) {
            ids.push(message.id);
        }
        ids
    }

    fn take(sub: &Subscription, n: usize) -> Vec<i64> {
        (0..n).map(|_| sub.recv_timeout(WAIT).unwrap().id).collect()
    }

    #[test]
    fn test_latest_skips_backlog() {
        let store = setup();
        publish(&store, &["old1", "old2"]);

        let worker = start(&store, &config(5, 100), Offset::LATEST);
        assert_eq!(worker.watermark(), 2);
        let sub = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();

        publish(&store, &["new"]);
        let message = sub.recv_timeout(WAIT).unwrap();
        assert_eq!(message.data, b"new");
        assert!(sub.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_catch_up_then_live_without_gap_or_duplicate() {
        let store = setup();
        publish(&store, &["1", "2", "3", "4", "5", "6", "7"]);

        let worker = start(&store, &config(60_000, 100), Offset::LATEST);
        let sub = worker.add_subscriber("a".into(), Offset(2)).unwrap();

        publish(&store, &["8", "9"]);
        worker.poll_now().unwrap();

        assert_eq!(take(&sub, 7), vec![3, 4, 5, 6, 7, 8, 9]);
        assert!(drain(&sub).is_empty());
    }

    #[test]
    fn test_latest_joins_at_store_tail_when_worker_is_behind() {
        let store = setup();
        publish(&store, &["old1", "old2", "old3"]);

        // The worker starts at the beginning and has not polled yet.
        let worker = start(&store, &config(60_000, 100), Offset(0));
        let replayer = worker.add_subscriber("replayer".into(), Offset(0)).unwrap();
        let tail = worker.add_subscriber("tail".into(), Offset::LATEST).unwrap();

        publish(&store, &["X"]);
        while worker.watermark() < 4 {
            worker.poll_now().unwrap();
        }

        assert_eq!(take(&replayer, 4), vec![1, 2, 3, 4]);
        let received: Vec<Vec<u8>> =
            std::iter::from_fn(|| tail.recv_timeout(Duration::from_millis(50)).ok())
                .map(|m| m.data)
                .collect();
        assert_eq!(received, vec![b"X".to_vec()]);
    }

    #[test]
    fn test_backlog_larger_than_buffer_is_not_dropped() {
        let store = setup();
        let payloads: Vec<String> = (1..=15).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = payloads.iter().map(|p| p.as_str()).collect();
        publish(&store, &refs);

        let worker = start(&store, &config(60_000, 100), Offset::LATEST);
        let sub = worker
            .add_subscriber_with_capacity("a".into(), Offset(0), 10)
            .unwrap();

        assert_eq!(take(&sub, 15), (1..=15).collect::<Vec<_>>());
        assert_eq!(worker.dropped_for(&"a".into()), Some(0));

        // Once caught up the subscriber is on the live path.
        publish(&store, &["16"]);
        worker.poll_now().unwrap();
        assert_eq!(take(&sub, 1), vec![16]);
    }

    #[test]
    fn test_catch_up_does_not_stall_live_delivery() {
        let store = setup();
        publish(&store, &["1", "2", "3", "4", "5", "6"]);

        let worker = start(&store, &config(60_000, 100), Offset::LATEST);
        // Never drained past the first message, so its catch-up stays blocked.
        let stuck = worker
            .add_subscriber_with_capacity("stuck".into(), Offset(0), 1)
            .unwrap();
        let live = worker.add_subscriber("live".into(), Offset::LATEST).unwrap();

        publish(&store, &["7"]);
        worker.poll_now().unwrap();
        assert_eq!(take(&live, 1), vec![7]);
        assert_eq!(worker.subscriber_count(), 2);

        // Removing it cancels the catch-up and closes the channel.
        assert!(worker.remove_subscriber(&"stuck".into()));
        assert_eq!(stuck.recv_timeout(WAIT).unwrap().id, 1);
        assert!(matches!(
            stuck.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_offset_ahead_of_watermark_is_respected() {
        let store = setup();
        publish(&store, &["1", "2", "3", "4"]);

        // Worker starts from the beginning; the subscriber only wants > 2.
        let worker = start(&store, &config(60_000, 100), Offset(0));
        let sub = worker.add_subscriber("a".into(), Offset(2)).unwrap();
        while worker.watermark() < 4 {
            worker.poll_now().unwrap();
        }

        assert_eq!(drain(&sub), vec![3, 4]);
    }

    #[test]
    fn test_fanout_to_many_subscribers() {
        let store = setup();
        let worker = start(&store, &config(5, 100), Offset::LATEST);
        let a = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();
        let b = worker.add_subscriber("b".into(), Offset::LATEST).unwrap();
        assert_eq!(worker.subscriber_count(), 2);

        publish(&store, &["x"]);
        assert_eq!(a.recv_timeout(WAIT).unwrap().data, b"x");
        assert_eq!(b.recv_timeout(WAIT).unwrap().data, b"x");
    }

    #[test]
    fn test_slow_subscriber_drops_without_blocking_others() {
        let store = setup();
        let worker = start(&store, &config(60_000, 100), Offset::LATEST);
        let slow = worker
            .add_subscriber_with_capacity("slow".into(), Offset::LATEST, 2)
            .unwrap();
        let fast = worker.add_subscriber("fast".into(), Offset::LATEST).unwrap();

        publish(&store, &["1", "2", "3"]);
        publish(&store, &["4", "5", "6"]);
        worker.poll_now().unwrap();
        worker.poll_now().unwrap();

        assert_eq!(worker.watermark(), 6);
        assert_eq!(worker.dropped_for(&"slow".into()), Some(4));
        assert_eq!(worker.dropped_for(&"fast".into()), Some(0));
        assert_eq!(drain(&slow), vec![1, 2]);
        assert_eq!(drain(&fast), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_remove_closes_channel() {
        let store = setup();
        let worker = start(&store, &config(5, 10), Offset::LATEST);
        let sub = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();

        assert!(worker.remove_subscriber(&"a".into()));
        assert!(!worker.remove_subscriber(&"a".into()));
        assert!(matches!(
            sub.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_reregister_closes_previous_channel() {
        let store = setup();
        let worker = start(&store, &config(5, 10), Offset::LATEST);
        let first = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();
        let second = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();

        assert_eq!(worker.subscriber_count(), 1);
        assert!(matches!(
            first.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));

        publish(&store, &["x"]);
        assert_eq!(second.recv_timeout(WAIT).unwrap().data, b"x");
    }

    #[test]
    fn test_fetch_error_keeps_watermark() {
        let store = setup();
        let worker = start(&store, &config(60_000, 10), Offset::LATEST);
        publish(&store, &["1", "2"]);

        store.fail_next_fetches(1);
        assert!(worker.poll_now().is_err());
        assert_eq!(worker.watermark(), 0);

        assert_eq!(worker.poll_now().unwrap(), 2);
        assert_eq!(worker.watermark(), 2);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let store = setup();
        let worker = start(&store, &config(60_000, 10), Offset::LATEST);
        let sub = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();
        drop(sub);

        publish(&store, &["1"]);
        worker.poll_now().unwrap();
        assert_eq!(worker.subscriber_count(), 0);
    }

    #[test]
    fn test_stop() {
        let store = setup();
        let worker = start(&store, &config(5, 10), Offset::LATEST);
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.poll_now().is_err());
        // Idempotent.
        worker.stop();
    }

    #[test]
    fn test_invalid_offset() {
        let store = setup();
        let result = PollWorker::start(
            "s",
            store.clone(),
            Arc::new(Stats::new()),
            &config(5, 10),
            Offset(-7),
        );
        assert!(matches!(result, Err(BusError::InvalidOffset(-7))));

        let worker = start(&store, &config(5, 10), Offset::LATEST);
        assert!(worker.add_subscriber("a".into(), Offset(-3)).is_err());
    }

    #[test]
    fn test_stat() {
        let store = setup();
        publish(&store, &["1"]);
        let worker = start(&store, &config(25, 10), Offset::LATEST);
        let _sub = worker.add_subscriber("a".into(), Offset::LATEST).unwrap();

        let stat = worker.stat();
        assert_eq!(stat.last_poll_id, 1);
        assert_eq!(stat.poll_interval_ms, 25);
        assert_eq!(stat.poll_batch_size, 3);
        assert_eq!(stat.subscribers, 1);
    }
}
