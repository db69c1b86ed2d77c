//! Core types for the message bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::BusError;

/// Nanoseconds since Unix epoch.
///
/// Advisory only: ordering within a stream is defined by message IDs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Timestamp(nanos)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Position in a stream, addressed by message ID.
///
/// Offsets are stream-local. [`Offset::LATEST`] is a sentinel meaning
/// "start from whatever is currently the newest message".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Offset(pub i64);

impl Offset {
    /// Start delivery at the current tail, ignoring backlog.
    pub const LATEST: Offset = Offset(-1);

    /// Start delivery from the first message in the stream.
    pub const EARLIEST: Offset = Offset(0);

    pub fn is_latest(self) -> bool {
        self == Offset::LATEST
    }
}

impl From<i64> for Offset {
    fn from(id: i64) -> Self {
        Offset(id)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({})", self)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_latest() {
            write!(f, "latest")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for Offset {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Offset::LATEST);
        }
        let value: i64 = s
            .parse()
            .map_err(|_| BusError::InvalidOffset(i64::MIN))?;
        if value < 0 && value != Offset::LATEST.0 {
            return Err(BusError::InvalidOffset(value));
        }
        Ok(Offset(value))
    }
}

/// A message stored in a stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Assigned by the store at commit time; strictly increasing per stream.
    pub id: i64,

    /// Producer-supplied or stamped at publish time.
    pub ts: Timestamp,

    /// Opaque payload.
    pub data: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message{{ID: {}, Ts: {}, Data: {}}}",
            self.id,
            self.ts.0,
            String::from_utf8_lossy(&self.data)
        )
    }
}

/// Input for publishing a message (before an ID is assigned).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageInput {
    pub data: Vec<u8>,
    pub ts: Option<Timestamp>,
}

impl MessageInput {
    /// Create a new input with a payload and no timestamp.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ts: None,
        }
    }

    /// Set an explicit producer timestamp.
    pub fn with_ts(mut self, ts: Timestamp) -> Self {
        self.ts = Some(ts);
        self
    }

    /// Stamp the current time if no timestamp was supplied.
    pub fn stamp(&mut self) -> Timestamp {
        *self.ts.get_or_insert_with(Timestamp::now)
    }
}

/// Identifier for a subscriber, unique within one stream.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        SubscriberId(s.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(s: String) -> Self {
        SubscriberId(s)
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
