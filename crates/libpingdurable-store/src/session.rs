//! `Transport` implementation over on-disk queues

use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use libpingdurable_core::{
    receive_deadline, ConnectionFailure, ConsumerSession, Message, ProducerSession,
    SessionOptions, Transport, TransportError,
};
use tracing::{debug, info, warn};

use crate::error::{publish_error, receive_error, StoreError};
use crate::queue::{LockedQueue, QueueStore, SessionLease};
use crate::watchdog::{Watchdog, DEFAULT_WATCH_INTERVAL};

/// Default time to wait for a queue lock held by another session
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker keeping one sled-backed queue per destination under `root`
#[derive(Debug, Clone)]
pub struct StoreBroker {
    root: PathBuf,
    lock_timeout: Duration,
    watch_interval: Duration,
}

impl StoreBroker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            watch_interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the queue named `queue`
    pub fn queue_dir(&self, queue: &str) -> PathBuf {
        self.root.join(queue)
    }

    /// Number of committed messages on `queue`; fails while a session holds it
    pub fn queue_depth(&self, queue: &str) -> Result<usize, StoreError> {
        let locked = QueueStore::open_locked_blocking(&self.queue_dir(queue), self.lock_timeout)?;
        Ok(locked.inner()?.len())
    }

    fn open_queue(&self, queue: &str, role: &str) -> Result<(LockedQueue, SessionLease), StoreError> {
        let dir = self.queue_dir(queue);
        let locked = QueueStore::open_locked_blocking(&dir, self.lock_timeout)?;
        let lease = SessionLease::new(role);
        lease.write(&dir)?;
        debug!(queue, role, session = %lease.session_id, "queue session opened");
        Ok((locked, lease))
    }
}

impl Transport for StoreBroker {
    type Producer = StoreProducer;
    type Consumer = StoreConsumer;

    fn open_producer(
        &self,
        options: &SessionOptions,
        failure: ConnectionFailure,
    ) -> Result<StoreProducer, TransportError> {
        let (queue, lease) = self.open_queue(&options.queue, "producer")?;
        let dir = self.queue_dir(&options.queue);
        let watchdog = Watchdog::spawn(dir.clone(), self.watch_interval, failure);

        Ok(StoreProducer {
            queue,
            lease,
            dir,
            options: options.clone(),
            pending: Vec::new(),
            watchdog,
            closed: false,
        })
    }

    fn open_consumer(&self, options: &SessionOptions) -> Result<StoreConsumer, TransportError> {
        let (queue, lease) = self.open_queue(&options.queue, "consumer")?;

        Ok(StoreConsumer {
            queue,
            lease,
            dir: self.queue_dir(&options.queue),
            closed: false,
        })
    }
}

fn release(queue: &mut LockedQueue, lease: &SessionLease, dir: &Path) -> Result<(), TransportError> {
    if dir.is_dir() {
        if let Err(e) = lease.release(dir) {
            warn!(error = %e, "failed to remove session lease");
        }
    }
    queue
        .close()
        .map_err(|e| TransportError::Close(e.to_string()))
}

/// Producing session holding the queue lock
pub struct StoreProducer {
    queue: LockedQueue,
    lease: SessionLease,
    dir: PathBuf,
    options: SessionOptions,
    pending: Vec<Message>,
    watchdog: Watchdog,
    closed: bool,
}

impl StoreProducer {
    fn commit(&mut self) -> Result<(), StoreError> {
        self.queue
            .inner()?
            .append_batch(&self.pending, self.options.persistent)?;
        self.pending.clear();
        Ok(())
    }
}

impl ProducerSession for StoreProducer {
    fn publish(&mut self, message: &Message) -> Result<bool, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.dir.is_dir() {
            return Err(publish_error(StoreError::Missing(self.dir.display().to_string())));
        }

        self.pending.push(message.clone());
        let commit_now = !self.options.transacted
            || self.pending.len() >= self.options.commit_batch_size.max(1) as usize;

        if commit_now {
            self.commit().map_err(publish_error)?;
        }
        Ok(commit_now)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.watchdog.stop();

        if !self.pending.is_empty() {
            debug!(
                session = %self.lease.session_id,
                rolled_back = self.pending.len(),
                "rolling back uncommitted messages"
            );
            self.pending.clear();
        }

        release(&mut self.queue, &self.lease, &self.dir)?;
        info!(session = %self.lease.session_id, "producer session closed");
        Ok(())
    }
}

impl Drop for StoreProducer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Consuming session holding the queue lock
pub struct StoreConsumer {
    queue: LockedQueue,
    lease: SessionLease,
    dir: PathBuf,
    closed: bool,
}

impl ConsumerSession for StoreConsumer {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let deadline = receive_deadline(timeout);
        loop {
            if let Some(message) = self.pop()? {
                return Ok(Some(message));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // Subscribe before looking again so an append in between still wakes us.
            // Dropped after the wait: our own pops would fill its bounded channel.
            let mut subscriber = self.queue.inner().map_err(receive_error)?.watch();
            if let Some(message) = self.pop()? {
                return Ok(Some(message));
            }

            match subscriber.next_timeout(remaining) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Receive("queue subscription closed".to_string()))
                }
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        release(&mut self.queue, &self.lease, &self.dir)?;
        debug!(session = %self.lease.session_id, "consumer session closed");
        Ok(())
    }
}

impl StoreConsumer {
    fn pop(&self) -> Result<Option<Message>, TransportError> {
        self.queue
            .inner()
            .and_then(QueueStore::pop_front)
            .map_err(receive_error)
    }
}

impl Drop for StoreConsumer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(transacted: bool, batch: u32) -> SessionOptions {
        SessionOptions {
            transacted,
            commit_batch_size: batch,
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_every_batch() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path());
        let mut producer = broker
            .open_producer(&options(true, 3), ConnectionFailure::new())
            .unwrap();

        let msg = Message::template(8, true);
        let commits: Vec<bool> = (0..7).map(|_| producer.publish(&msg).unwrap()).collect();
        assert_eq!(commits, vec![false, false, true, false, false, true, false]);

        producer.close().unwrap();
        assert_eq!(broker.queue_depth("ping").unwrap(), 6);
    }

    #[test]
    fn test_non_transacted_commits_each_publish() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path());
        let mut producer = broker
            .open_producer(&options(false, 10), ConnectionFailure::new())
            .unwrap();

        assert!(producer.publish(&Message::template(0, false)).unwrap());
        producer.close().unwrap();
        assert_eq!(broker.queue_depth("ping").unwrap(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path());
        let mut consumer = broker.open_consumer(&SessionOptions::default()).unwrap();

        consumer.close().unwrap();
        consumer.close().unwrap();
        assert!(matches!(
            consumer.receive(Duration::from_millis(1)),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_receive_times_out_on_empty_queue() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path());
        let mut consumer = broker.open_consumer(&SessionOptions::default()).unwrap();

        let start = Instant::now();
        assert_eq!(consumer.receive(Duration::from_millis(60)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_closed_producer_frees_queue_for_consumer() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path()).with_lock_timeout(Duration::from_millis(100));
        let mut producer = broker
            .open_producer(&options(true, 1), ConnectionFailure::new())
            .unwrap();
        producer.publish(&Message::template(4, true)).unwrap();
        producer.close().unwrap();

        // `producer` is still in scope; close alone must have released the lock
        let mut consumer = broker.open_consumer(&SessionOptions::default()).unwrap();
        assert!(consumer.receive(Duration::from_millis(50)).unwrap().is_some());
        drop(producer);
    }

    #[test]
    fn test_drains_backlog_larger_than_subscriber_buffer() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path());
        let mut producer = broker
            .open_producer(&options(true, 500), ConnectionFailure::new())
            .unwrap();
        let msg = Message::template(0, false);
        for _ in 0..2000 {
            producer.publish(&msg).unwrap();
        }
        producer.close().unwrap();

        let mut consumer = broker.open_consumer(&SessionOptions::default()).unwrap();
        let mut received = 0;
        while consumer.receive(Duration::from_millis(50)).unwrap().is_some() {
            received += 1;
        }
        assert_eq!(received, 2000);
    }

    #[test]
    fn test_unbounded_timeout_does_not_overflow() {
        let dir = tempdir().unwrap();
        let broker = StoreBroker::new(dir.path());
        let mut producer = broker
            .open_producer(&options(false, 1), ConnectionFailure::new())
            .unwrap();
        producer.publish(&Message::template(1, true)).unwrap();
        producer.close().unwrap();

        let mut consumer = broker.open_consumer(&SessionOptions::default()).unwrap();
        assert!(consumer.receive(Duration::MAX).unwrap().is_some());
    }
}
