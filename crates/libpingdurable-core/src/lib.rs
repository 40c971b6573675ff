//! Core library for the pingdurable two-phase durability driver
//!
//! This crate provides:
//! - Immutable run configuration (PingConfig) with TOML and override layering
//! - Stop-condition evaluation for both phases
//! - Transactional commit accounting (CommitBatcher)
//! - Transport traits plus an in-process MemoryBroker
//! - The send and receive drivers and the operator handoff between them
//! - Signal plumbing: cancellation token and connection-failure flag

use std::time::Duration;

pub mod batch;
pub mod condition;
pub mod config;
pub mod console;
pub mod driver;
pub mod duration;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod report;
pub mod signal;
pub mod throttle;
pub mod transport;

pub use batch::CommitBatcher;
pub use condition::{ReceiveStopReason, SendSignals, SendStopReason};
pub use config::{ConfigFile, ConfigOverrides, PingConfig};
pub use console::{ChannelConsole, ConsoleEvent, OperatorConsole};
pub use driver::{ReceiveDriver, ReceiveOutcome, SendDriver, SendOutcome};
pub use error::{ConfigError, TransportError};
pub use handoff::{wait_for_operator, HandoffOutcome};
pub use report::RunReport;
pub use signal::{CancellationToken, ConnectionFailure};
pub use transport::memory::MemoryBroker;
pub use transport::{
    receive_deadline, ConsumerSession, Message, ProducerSession, SessionOptions, Transport,
};

/// Default number of messages to send
pub const DEFAULT_NUM_MESSAGES: u64 = 100;

/// Default maximum length of the send phase
pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);

/// Default publish rate in messages per second
pub const DEFAULT_RATE: u32 = 20;

/// Default transactional batch size
pub const DEFAULT_COMMIT_BATCH_SIZE: u32 = 10;

/// Default idle timeout applied to each pull in the receive phase
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default destination queue name
pub const DEFAULT_QUEUE: &str = "ping";
