//! Durable queue broker for pingdurable
//!
//! Each destination queue is a sled database guarded by an exclusive fs2
//! lock, so at most one session (producer or consumer) can hold a queue at a
//! time and committed messages survive both session teardown and process
//! restarts.

pub mod error;
pub mod queue;
pub mod session;
pub mod watchdog;

pub use error::StoreError;
pub use queue::{LockedQueue, QueueStore, SessionLease};
pub use session::{StoreBroker, StoreConsumer, StoreProducer, DEFAULT_LOCK_TIMEOUT};
pub use watchdog::Watchdog;
