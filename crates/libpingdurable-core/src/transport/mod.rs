//! Messaging transport facade
//!
//! The drivers only talk to a broker through these traits. A `Transport`
//! opens at most one session at a time; the drivers always close the session
//! they opened before the next phase begins.

pub mod memory;

use std::time::{Duration, Instant};

use crate::error::TransportError;
use crate::signal::ConnectionFailure;

/// An opaque message; the drivers count messages and never inspect payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Vec<u8>,
    pub persistent: bool,
}

impl Message {
    pub fn new(payload: Vec<u8>, persistent: bool) -> Self {
        Self { payload, persistent }
    }

    /// Build a reusable template message of `size` payload bytes
    pub fn template(size: usize, persistent: bool) -> Self {
        Self {
            payload: vec![0u8; size],
            persistent,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Longest single pull when the requested timeout does not fit in an `Instant`
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deadline for a pull of `timeout`, capped at `MAX_RECEIVE_WAIT` when `now + timeout` overflows
pub fn receive_deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_RECEIVE_WAIT))
        .unwrap_or(now)
}

/// Options a session is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Destination queue name
    pub queue: String,
    /// Publish inside transactions committed every `commit_batch_size` messages
    pub transacted: bool,
    /// Persistent delivery: commits are flushed to stable storage
    pub persistent: bool,
    pub commit_batch_size: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            queue: crate::DEFAULT_QUEUE.to_string(),
            transacted: true,
            persistent: true,
            commit_batch_size: crate::DEFAULT_COMMIT_BATCH_SIZE,
        }
    }
}

/// A connection factory for producer and consumer sessions
pub trait Transport {
    type Producer: ProducerSession;
    type Consumer: ConsumerSession;

    /// Open a producing session.
    ///
    /// The transport raises `failure` from its own thread if the connection
    /// is lost while the session is open.
    fn open_producer(
        &self,
        options: &SessionOptions,
        failure: ConnectionFailure,
    ) -> Result<Self::Producer, TransportError>;

    /// Open a fresh consuming session
    fn open_consumer(&self, options: &SessionOptions) -> Result<Self::Consumer, TransportError>;
}

/// A producing session
pub trait ProducerSession {
    /// Publish one message.
    ///
    /// Returns `true` when this publish committed a transaction, covering
    /// every message published since the previous commit. Non-transacted
    /// sessions commit every publish.
    fn publish(&mut self, message: &Message) -> Result<bool, TransportError>;

    /// Release the session. Uncommitted messages are rolled back.
    ///
    /// Closing an already closed session is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// A consuming session; delivery is pull-based only
pub trait ConsumerSession {
    /// Wait up to `timeout` for the next message
    fn receive(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError>;

    /// Release the session. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_size() {
        let msg = Message::template(256, true);
        assert_eq!(msg.size(), 256);
        assert!(msg.persistent);
        assert_eq!(Message::template(0, false).size(), 0);
    }

    #[test]
    fn test_receive_deadline_caps_overflow() {
        let before = Instant::now();
        let capped = receive_deadline(Duration::MAX);
        assert!(capped > before);

        let short = receive_deadline(Duration::from_millis(10));
        assert!(short < capped);
    }
}
