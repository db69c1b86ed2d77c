//! Subscription types for live stream delivery.

use crate::types::{Message, SubscriberId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of a poll worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Resolving the starting watermark; the poll loop has not run yet.
    Initializing,
    /// Polling on a fixed interval and fanning out new messages.
    Running,
    /// Terminal: the poll loop has exited.
    Stopped,
}

impl WorkerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            WorkerState::Initializing => 0,
            WorkerState::Running => 1,
            WorkerState::Stopped => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Initializing,
            1 => WorkerState::Running,
            _ => WorkerState::Stopped,
        }
    }
}

/// Handle to a registered subscriber.
///
/// The channel is closed when the subscriber is removed or replaced, so
/// `recv` returns an error instead of blocking forever.
pub struct Subscription {
    pub id: SubscriberId,
    pub stream: String,
    /// Channel to receive messages.
    pub receiver: crossbeam_channel::Receiver<Message>,
}

impl Subscription {
    /// Receive the next message (blocking).
    pub fn recv(&self) -> Result<Message, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> Result<Message, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Message, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Blocking iterator that ends when the channel is closed.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, Message> {
        self.receiver.iter()
    }

    /// Messages waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
