//! # Tablebus
//!
//! A durable publish/subscribe message bus over a transactional table store.
//!
//! ## Core Concepts
//!
//! - **Streams**: Named append-only logs; publishes are coalesced into batched writes
//! - **Poll workers**: One per subscribed stream, fanning new messages out to subscribers
//! - **Offsets**: Subscribers start at a message ID or at the latest message
//! - **Reclamation**: Count-based retention of the most recent messages
//!
//! ## Example
//!
//! ```ignore
//! use tablebus::{Hub, HubConfig, MessageInput, Offset};
//!
//! let hub = Hub::open(HubConfig {
//!     dsn: "./bus.db".into(),
//!     ..Default::default()
//! })?;
//!
//! let sub = hub.subscribe("orders", "billing", Offset::EARLIEST)?;
//!
//! // Queue a message; it is written with the next batch
//! hub.publish("orders", MessageInput::new("order #1"))?;
//!
//! let message = sub.recv()?;
//! println!("{}", message);
//! ```

pub mod config;
pub mod error;
pub mod gc;
pub mod hub;
pub mod stats;
pub mod store;
pub mod stream;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::HubConfig;
pub use error::{BusError, Result};
pub use gc::{GcResult, GcWorker};
pub use hub::Hub;
pub use stats::{Stats, StatsSnapshot, StreamStat, WorkerStat};
pub use store::{MemoryStore, SqliteStore, Store};
pub use stream::Stream;
pub use subscriptions::{PollWorker, Subscription, WorkerState};
pub use types::*;
