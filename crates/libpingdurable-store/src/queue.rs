//! On-disk queue backed by sled
//!
//! Each queue owns a directory `<root>/<queue>/` holding the sled database
//! (`data/`), its exclusive lock file (`data.lock`) and a lease record
//! (`session.json`) describing the session that currently holds the lock.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use libpingdurable_core::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

/// Message record as written to the `messages` tree
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    payload: Vec<u8>,
    persistent: bool,
    enqueued_ts: i64,
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Message::new(stored.payload, stored.persistent)
    }
}

/// Who holds a queue, written next to the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLease {
    pub session_id: String,
    pub pid: u32,
    pub role: String,
    pub opened_at: DateTime<Utc>,
}

impl SessionLease {
    pub fn new(role: &str) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            role: role.to_string(),
            opened_at: Utc::now(),
        }
    }

    pub fn path(queue_dir: &Path) -> PathBuf {
        queue_dir.join("session.json")
    }

    pub fn read(queue_dir: &Path) -> Result<Option<Self>, StoreError> {
        let path = Self::path(queue_dir);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn write(&self, queue_dir: &Path) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(queue_dir), contents)?;
        Ok(())
    }

    /// Remove the lease if it is still ours
    pub fn release(&self, queue_dir: &Path) -> Result<(), StoreError> {
        if let Some(current) = Self::read(queue_dir)? {
            if current.session_id == self.session_id {
                fs::remove_file(Self::path(queue_dir))?;
            }
        }
        Ok(())
    }
}

/// A `QueueStore` holding the queue's exclusive filesystem lock.
///
/// `close` (or drop) releases the database first, then the lock.
pub struct LockedQueue {
    store: Option<QueueStore>,
    lock_file: Option<File>,
}

impl LockedQueue {
    pub fn inner(&self) -> Result<&QueueStore, StoreError> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Missing("queue store already closed".to_string()))
    }

    /// Whether the queue lock is still held
    pub fn is_locked(&self) -> bool {
        self.lock_file.is_some()
    }

    /// Flush and drop the database, then release the lock.
    ///
    /// The lock is released even when the final flush fails.
    pub fn close(&mut self) -> Result<(), StoreError> {
        let flushed = match self.store.take() {
            Some(store) => store.flush(),
            None => Ok(()),
        };

        if let Some(lock_file) = self.lock_file.take() {
            if let Err(e) = FileExt::unlock(&lock_file) {
                debug!(error = %e, "unlock failed, lock released when the file closes");
            }
        }

        flushed?;
        Ok(())
    }
}

impl Drop for LockedQueue {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for LockedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedQueue")
            .field("open", &self.store.is_some())
            .field("locked", &self.lock_file.is_some())
            .finish()
    }
}

/// Durable FIFO of messages
pub struct QueueStore {
    db: sled::Db,
    messages: sled::Tree,
}

impl QueueStore {
    /// Open or create the sled database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let messages = db.open_tree("messages")?;
        Ok(Self { db, messages })
    }

    /// Open the queue in `queue_dir` with its exclusive lock, retrying with
    /// backoff until `timeout` elapses.
    pub fn open_locked_blocking(
        queue_dir: &Path,
        timeout: Duration,
    ) -> Result<LockedQueue, StoreError> {
        fs::create_dir_all(queue_dir)?;
        let data_path = queue_dir.join("data");
        let lock_path = data_path.with_extension("lock");
        let lock_file = File::create(&lock_path)?;

        let start = Instant::now();
        let mut delay = Duration::from_millis(10);

        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_millis(200));
                }
                Err(e) => {
                    let holder = SessionLease::read(queue_dir)
                        .ok()
                        .flatten()
                        .map(|lease| format!(" (held by {} session pid {})", lease.role, lease.pid))
                        .unwrap_or_default();
                    return Err(StoreError::Busy(format!(
                        "timeout waiting for queue lock{}: {}",
                        holder, e
                    )));
                }
            }
        }

        let store = Self::open(&data_path)?;
        Ok(LockedQueue {
            store: Some(store),
            lock_file: Some(lock_file),
        })
    }

    /// Append `messages` atomically, in order.
    ///
    /// With `flush` set the call returns only after the batch is on stable storage.
    pub fn append_batch(&self, messages: &[Message], flush: bool) -> Result<usize, StoreError> {
        let enqueued_ts = Utc::now().timestamp_millis();
        let mut batch = sled::Batch::default();

        for message in messages {
            let key = self.db.generate_id()?.to_be_bytes();
            let record = StoredMessage {
                payload: message.payload.clone(),
                persistent: message.persistent,
                enqueued_ts,
            };
            batch.insert(&key[..], serde_json::to_vec(&record)?);
        }

        self.messages.apply_batch(batch)?;
        if flush {
            self.db.flush()?;
        }

        debug!(count = messages.len(), flush, "appended batch");
        Ok(messages.len())
    }

    /// Remove and return the oldest message
    pub fn pop_front(&self) -> Result<Option<Message>, StoreError> {
        match self.messages.pop_min()? {
            Some((_, value)) => {
                let record: StoredMessage = serde_json::from_slice(&value)?;
                Ok(Some(record.into()))
            }
            None => Ok(None),
        }
    }

    /// Number of messages on the queue
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Subscribe to every change on the queue.
    ///
    /// sled's subscriber channel is bounded and blocks writers once full, so
    /// keep a subscriber only while waiting on it.
    pub fn watch(&self) -> sled::Subscriber {
        self.messages.watch_prefix(Vec::<u8>::new())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
