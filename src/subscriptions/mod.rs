//! Subscribe side: per-stream polling and fan-out.
//!
//! One [`PollWorker`] runs per subscribed stream. It polls the store for
//! messages newer than its watermark and pushes each batch to every
//! registered subscriber's bounded channel. Delivery never blocks the poll
//! loop: a full buffer drops the message for that subscriber only.
//!
//! Subscribers joining behind the watermark are fed the missed range from
//! the store by a short-lived catch-up thread, at the pace the consumer
//! drains it. They join the live set under the fan-out lock once the
//! catch-up reaches the watermark, so they see neither a gap nor a duplicate.
//!
//! # Example
//!
//! ```ignore
//! let worker = PollWorker::start("orders", store, stats, &config, Offset::LATEST)?;
//! let sub = worker.add_subscriber("sub-1".into(), Offset::LATEST)?;
//!
//! for message in sub.iter() {
//!     println!("{}", message);
//! }
//! ```

mod types;
mod worker;

pub use types::{Subscription, WorkerState};
pub use worker::PollWorker;
