//! In-process broker
//!
//! Queues live as long as the `MemoryBroker` handle, so messages survive a
//! session teardown and a fresh consumer sees everything that was committed.
//! The broker admits one open session at a time and supports fault
//! injection for exercising the drivers' failure paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    receive_deadline, ConsumerSession, Message, ProducerSession, SessionOptions, Transport,
};
use crate::error::TransportError;
use crate::signal::ConnectionFailure;

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Message>>,
    open_session: Option<Uuid>,
    sessions_opened: u64,
    /// Publishes that may still succeed before injected failures start
    publish_budget: Option<u64>,
    severed: bool,
    producer_flags: Vec<(Uuid, ConnectionFailure)>,
}

/// Shared handle to an in-process broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<(Mutex<BrokerState>, Condvar)>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("sessions_opened", &self.sessions_opened())
            .finish()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of committed messages waiting on a queue
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Whether a session is currently open
    pub fn has_open_session(&self) -> bool {
        self.state().open_session.is_some()
    }

    /// Total number of sessions opened over the broker's lifetime
    pub fn sessions_opened(&self) -> u64 {
        self.state().sessions_opened
    }

    /// Place committed messages directly on a queue, e.g. leftovers from an earlier run
    pub fn enqueue(&self, queue: &str, messages: impl IntoIterator<Item = Message>) {
        let mut state = self.state();
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .extend(messages);
        self.inner.1.notify_all();
    }

    /// Let `count` more publishes succeed, then fail every publish after that
    pub fn fail_publishes_after(&self, count: u64) {
        self.state().publish_budget = Some(count);
    }

    /// Drop the connection: open producers see their failure flag raised and
    /// every publish, receive, or connect fails until `restore` is called
    pub fn sever(&self) {
        let mut state = self.state();
        state.severed = true;
        for (id, flag) in &state.producer_flags {
            debug!(session = %id, "raising connection failure");
            flag.raise();
        }
        self.inner.1.notify_all();
        warn!("memory broker connection severed");
    }

    /// Bring the broker back after `sever` and clear injected publish failures
    pub fn restore(&self) {
        let mut state = self.state();
        state.severed = false;
        state.publish_budget = None;
        info!("memory broker restored");
    }

    fn open_session(&self) -> Result<Uuid, TransportError> {
        let mut state = self.state();
        if state.severed {
            return Err(TransportError::Connect("broker unreachable".to_string()));
        }
        if let Some(existing) = state.open_session {
            return Err(TransportError::Busy(format!(
                "session {} is still open",
                existing
            )));
        }
        let id = Uuid::new_v4();
        state.open_session = Some(id);
        state.sessions_opened += 1;
        Ok(id)
    }

    fn release_session(&self, id: Uuid) {
        let mut state = self.state();
        if state.open_session == Some(id) {
            state.open_session = None;
        }
        state.producer_flags.retain(|(flag_id, _)| *flag_id != id);
    }
}

impl Transport for MemoryBroker {
    type Producer = MemoryProducer;
    type Consumer = MemoryConsumer;

    fn open_producer(
        &self,
        options: &SessionOptions,
        failure: ConnectionFailure,
    ) -> Result<MemoryProducer, TransportError> {
        let id = self.open_session()?;
        self.state().producer_flags.push((id, failure));
        debug!(session = %id, queue = %options.queue, "memory producer opened");

        Ok(MemoryProducer {
            broker: self.clone(),
            id,
            options: options.clone(),
            pending: Vec::new(),
            closed: false,
        })
    }

    fn open_consumer(&self, options: &SessionOptions) -> Result<MemoryConsumer, TransportError> {
        let id = self.open_session()?;
        debug!(session = %id, queue = %options.queue, "memory consumer opened");

        Ok(MemoryConsumer {
            broker: self.clone(),
            id,
            queue: options.queue.clone(),
            closed: false,
        })
    }
}

/// Producing session on a `MemoryBroker`
pub struct MemoryProducer {
    broker: MemoryBroker,
    id: Uuid,
    options: SessionOptions,
    pending: Vec<Message>,
    closed: bool,
}

impl ProducerSession for MemoryProducer {
    fn publish(&mut self, message: &Message) -> Result<bool, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut state = self.broker.state();
        if state.severed {
            return Err(TransportError::Publish("connection severed".to_string()));
        }
        match state.publish_budget {
            Some(0) => {
                return Err(TransportError::Publish("injected publish failure".to_string()));
            }
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }

        self.pending.push(message.clone());
        let commit_now = !self.options.transacted
            || self.pending.len() >= self.options.commit_batch_size.max(1) as usize;

        if commit_now {
            state
                .queues
                .entry(self.options.queue.clone())
                .or_default()
                .extend(self.pending.drain(..));
            self.broker.inner.1.notify_all();
        }

        Ok(commit_now)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.pending.is_empty() {
            debug!(
                session = %self.id,
                rolled_back = self.pending.len(),
                "rolling back uncommitted messages"
            );
            self.pending.clear();
        }
        self.broker.release_session(self.id);
        Ok(())
    }
}

impl Drop for MemoryProducer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Consuming session on a `MemoryBroker`
pub struct MemoryConsumer {
    broker: MemoryBroker,
    id: Uuid,
    queue: String,
    closed: bool,
}

impl ConsumerSession for MemoryConsumer {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let deadline = receive_deadline(timeout);
        let (_, cvar) = &*self.broker.inner;
        let mut state = self.broker.state();

        loop {
            if state.severed {
                return Err(TransportError::Receive("connection severed".to_string()));
            }
            if let Some(message) = state.queues.get_mut(&self.queue).and_then(VecDeque::pop_front) {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = cvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.broker.release_session(self.id);
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
