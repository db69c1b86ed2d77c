//! Integration tests for the message bus over a SQLite store.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tablebus::{
    Hub, HubConfig, MessageInput, Offset, SqliteStore, Stats, Store, WorkerState,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config(dir: &TempDir) -> HubConfig {
    HubConfig {
        dsn: dir.path().join("bus.db").to_string_lossy().into_owned(),
        poll_interval_ms: 10,
        flush_timeout_ms: 10,
        gc_interval_secs: 3600,
        ..Default::default()
    }
}

fn test_hub(dir: &TempDir) -> Hub {
    init_tracing();
    Hub::open(test_config(dir)).unwrap()
}

fn payloads(hub: &Hub, stream: &str) -> Vec<String> {
    hub.messages_since_offset(stream, Offset::EARLIEST)
        .unwrap()
        .into_iter()
        .map(|m| String::from_utf8(m.data).unwrap())
        .collect()
}

// --- Delivery ---

#[test]
fn test_publish_then_replay_from_earliest() {
    let dir = TempDir::new().unwrap();
    let hub = test_hub(&dir);

    for payload in ["A", "B", "C"] {
        hub.publish_durable("orders", MessageInput::new(payload)).unwrap();
    }

    let sub = hub.subscribe("orders", "reader", Offset::EARLIEST).unwrap();
    let received: Vec<Vec<u8>> = (0..3)
        .map(|_| sub.recv_timeout(WAIT).unwrap().data)
        .collect();
    assert_eq!(received, vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);
}

#[test]
fn test_tail_subscriber_skips_history() {
    let dir = TempDir::new().unwrap();
    let hub = test_hub(&dir);

    hub.publish_durable("orders", MessageInput::new("before")).unwrap();
    let sub = hub.subscribe("orders", "tail", Offset::LATEST).unwrap();
    hub.publish("orders", MessageInput::new("X")).unwrap();

    let message = sub.recv_timeout(WAIT).unwrap();
    assert_eq!(message.data, b"X");
    assert!(sub.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_late_subscriber_catches_up_without_gap() {
    let dir = TempDir::new().unwrap();
    let hub = test_hub(&dir);

    // The worker starts at the tail; the second subscriber wants history.
    let live = hub.subscribe("events", "live", Offset::LATEST).unwrap();
    for i in 1..=20 {
        hub.publish("events", MessageInput::new(format!("{}", i))).unwrap();
    }
    for _ in 0..20 {
        live.recv_timeout(WAIT).unwrap();
    }

    let late = hub.subscribe("events", "late", Offset(5)).unwrap();
    for i in 21..=30 {
        hub.publish("events", MessageInput::new(format!("{}", i))).unwrap();
    }

    let ids: Vec<i64> = (0..25).map(|_| late.recv_timeout(WAIT).unwrap().id).collect();
    let expected: Vec<i64> = (6..=30).collect();
    assert_eq!(ids, expected);
    assert!(late.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_concurrent_publishers_keep_per_stream_order() {
    let dir = TempDir::new().unwrap();
    let hub = Arc::new(test_hub(&dir));

    let handles: Vec<_> = (0..4)
        .map(|p| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for i in 0..50 {
                    hub.publish("shared", MessageInput::new(format!("{}-{}", p, i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    hub.shutdown();

    let messages = payloads(&hub, "shared");
    assert_eq!(messages.len(), 200);
    // Each publisher's own messages stay in publish order.
    for p in 0..4 {
        let prefix = format!("{}-", p);
        let seq: Vec<usize> = messages
            .iter()
            .filter_map(|m| m.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn test_streams_are_independent() {
    let dir = TempDir::new().unwrap();
    let hub = test_hub(&dir);

    let a = hub.subscribe("alpha", "s", Offset::LATEST).unwrap();
    let b = hub.subscribe("beta", "s", Offset::LATEST).unwrap();
    hub.publish("alpha", MessageInput::new("to-alpha")).unwrap();

    assert_eq!(a.recv_timeout(WAIT).unwrap().data, b"to-alpha");
    assert!(b.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(hub.streams().unwrap(), vec!["alpha", "beta"]);
}

// --- Retention ---

#[test]
fn test_retention_keeps_newest() {
    let dir = TempDir::new().unwrap();
    let config = HubConfig {
        gc_keep_items: 2,
        ..test_config(&dir)
    };
    let hub = Hub::open(config).unwrap();

    for i in 0..5 {
        hub.publish_durable("orders", MessageInput::new(format!("{}", i)))
            .unwrap();
    }
    let result = hub.force_gc_stream("orders").unwrap();
    assert_eq!(result.deleted, 3);
    assert_eq!(hub.min_max_id("orders").unwrap(), (4, 5));

    // IDs keep growing after reclamation.
    let next = hub.publish_durable("orders", MessageInput::new("5")).unwrap();
    assert_eq!(next.id, 6);
}

// --- Durability ---

#[test]
fn test_reopen_preserves_messages_and_ids() {
    let dir = TempDir::new().unwrap();
    {
        let hub = test_hub(&dir);
        hub.publish("orders", MessageInput::new("one")).unwrap();
        hub.publish("orders", MessageInput::new("two")).unwrap();
        // Dropping the hub flushes the queue.
    }

    let hub = test_hub(&dir);
    assert_eq!(payloads(&hub, "orders"), vec!["one", "two"]);
    assert_eq!(hub.streams().unwrap(), vec!["orders"]);

    let third = hub.publish_durable("orders", MessageInput::new("three")).unwrap();
    assert_eq!(third.id, 3);
}

#[test]
fn test_shared_store_and_stats() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&test_config(&dir).dsn).unwrap());
    let stats = Arc::new(Stats::new());
    let hub = Hub::with_store(test_config(&dir), store.clone(), stats.clone()).unwrap();

    let sub = hub.subscribe("metrics", "s", Offset::LATEST).unwrap();
    hub.publish_durable("metrics", MessageInput::new("m")).unwrap();
    sub.recv_timeout(WAIT).unwrap();

    assert_eq!(store.min_max_id("metrics").unwrap(), (1, 1));
    assert_eq!(stats.snapshot().messages_published, 1);

    let worker = hub.stat("metrics").unwrap().worker.unwrap();
    assert_eq!(worker.state, WorkerState::Running);
    assert_eq!(worker.subscribers, 1);
    assert_eq!(worker.last_poll_id, 1);
}
