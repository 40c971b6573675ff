//! Phase drivers
//!
//! Each driver owns the only open session for the duration of its phase and
//! always closes it before returning, whatever ended the phase.

pub mod receive;
pub mod send;

pub use receive::{ReceiveDriver, ReceiveOutcome};
pub use send::{SendDriver, SendOutcome};

use crate::condition::{ReceiveStopReason, SendStopReason};

/// Hooks for reporting phase progress as it happens
pub trait PhaseObserver {
    /// A transaction committed; `committed_total` is the running committed count
    fn on_commit(&mut self, _committed_total: u64) {}

    fn on_send_halted(&mut self, _reason: SendStopReason) {}

    fn on_receive_halted(&mut self, _reason: ReceiveStopReason) {}
}

impl PhaseObserver for () {}
