//! Stop-condition evaluation for both phases
//!
//! The evaluator is pure: it only looks at the values it is given and returns
//! at most one reason per call. Priority order only affects which reason is
//! reported when several conditions hold at once.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why the send phase halted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStopReason {
    DurationExpired,
    CountReached,
    OperatorInterrupt,
    ConnectionError,
    Shutdown,
}

impl SendStopReason {
    /// Operator-facing line printed when the phase halts
    pub fn describe(&self) -> &'static str {
        match self {
            SendStopReason::DurationExpired => "Send halted because duration expired.",
            SendStopReason::CountReached => "Send halted because # messages completed.",
            SendStopReason::OperatorInterrupt => "Send halted by user input.",
            SendStopReason::ConnectionError => "Send halted by error on the connection.",
            SendStopReason::Shutdown => "Send halted by shutdown request.",
        }
    }
}

/// Why the receive phase halted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveStopReason {
    AllReceived,
    IdleTimeout,
    ConnectionError,
    Shutdown,
}

impl ReceiveStopReason {
    pub fn describe(&self) -> &'static str {
        match self {
            ReceiveStopReason::AllReceived => "Got all messages.",
            ReceiveStopReason::IdleTimeout => "Timed out.",
            ReceiveStopReason::ConnectionError => "Receive halted by error on the connection.",
            ReceiveStopReason::Shutdown => "Receive halted by shutdown request.",
        }
    }
}

/// Limits that end the send phase; zero means "no limit from this source"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendLimits {
    pub target_count: u64,
    pub max_duration: Duration,
}

/// External signals sampled once per send iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSignals {
    pub operator_interrupt: bool,
    pub connection_error: bool,
    pub shutdown: bool,
}

/// Decide whether the send phase should stop.
///
/// Priority: duration, count, operator input, connection error, shutdown.
pub fn evaluate_send(
    limits: &SendLimits,
    elapsed: Duration,
    sent: u64,
    signals: &SendSignals,
) -> Option<SendStopReason> {
    if !limits.max_duration.is_zero() && elapsed >= limits.max_duration {
        Some(SendStopReason::DurationExpired)
    } else if limits.target_count > 0 && sent >= limits.target_count {
        Some(SendStopReason::CountReached)
    } else if signals.operator_interrupt {
        Some(SendStopReason::OperatorInterrupt)
    } else if signals.connection_error {
        Some(SendStopReason::ConnectionError)
    } else if signals.shutdown {
        Some(SendStopReason::Shutdown)
    } else {
        None
    }
}

/// Result of a single pull in the receive phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullResult {
    Received,
    TimedOut,
    Failed,
}

/// Decide whether the receive phase should stop after a pull
pub fn evaluate_receive(
    pull: PullResult,
    received: u64,
    target: u64,
    shutdown: bool,
) -> Option<ReceiveStopReason> {
    match pull {
        PullResult::TimedOut => Some(ReceiveStopReason::IdleTimeout),
        PullResult::Failed => Some(ReceiveStopReason::ConnectionError),
        PullResult::Received if received >= target => Some(ReceiveStopReason::AllReceived),
        PullResult::Received if shutdown => Some(ReceiveStopReason::Shutdown),
        PullResult::Received => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(target_count: u64, secs: u64) -> SendLimits {
        SendLimits {
            target_count,
            max_duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_no_limits_never_stop_without_signal() {
        let l = limits(0, 0);
        let quiet = SendSignals::default();
        assert_eq!(evaluate_send(&l, Duration::from_secs(3600), 1_000_000, &quiet), None);
    }

    #[test]
    fn test_duration_boundary_is_inclusive() {
        let l = limits(0, 30);
        let quiet = SendSignals::default();
        assert_eq!(evaluate_send(&l, Duration::from_millis(29_999), 0, &quiet), None);
        assert_eq!(
            evaluate_send(&l, Duration::from_secs(30), 0, &quiet),
            Some(SendStopReason::DurationExpired)
        );
    }

    #[test]
    fn test_count_reached() {
        let l = limits(5, 0);
        let quiet = SendSignals::default();
        assert_eq!(evaluate_send(&l, Duration::ZERO, 4, &quiet), None);
        assert_eq!(
            evaluate_send(&l, Duration::ZERO, 5, &quiet),
            Some(SendStopReason::CountReached)
        );
    }

    #[test]
    fn test_priority_order() {
        let l = limits(5, 10);
        let all = SendSignals {
            operator_interrupt: true,
            connection_error: true,
            shutdown: true,
        };

        assert_eq!(
            evaluate_send(&l, Duration::from_secs(11), 5, &all),
            Some(SendStopReason::DurationExpired)
        );
        assert_eq!(
            evaluate_send(&l, Duration::from_secs(1), 5, &all),
            Some(SendStopReason::CountReached)
        );
        assert_eq!(
            evaluate_send(&l, Duration::from_secs(1), 1, &all),
            Some(SendStopReason::OperatorInterrupt)
        );

        let no_input = SendSignals {
            operator_interrupt: false,
            ..all
        };
        assert_eq!(
            evaluate_send(&l, Duration::from_secs(1), 1, &no_input),
            Some(SendStopReason::ConnectionError)
        );

        let shutdown_only = SendSignals {
            shutdown: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate_send(&l, Duration::from_secs(1), 1, &shutdown_only),
            Some(SendStopReason::Shutdown)
        );
    }

    #[test]
    fn test_receive_conditions() {
        assert_eq!(evaluate_receive(PullResult::Received, 3, 5, false), None);
        assert_eq!(
            evaluate_receive(PullResult::Received, 5, 5, false),
            Some(ReceiveStopReason::AllReceived)
        );
        assert_eq!(
            evaluate_receive(PullResult::TimedOut, 3, 5, false),
            Some(ReceiveStopReason::IdleTimeout)
        );
        assert_eq!(
            evaluate_receive(PullResult::Failed, 3, 5, false),
            Some(ReceiveStopReason::ConnectionError)
        );
        assert_eq!(
            evaluate_receive(PullResult::Received, 3, 5, true),
            Some(ReceiveStopReason::Shutdown)
        );
    }

    #[test]
    fn test_all_received_wins_over_shutdown() {
        assert_eq!(
            evaluate_receive(PullResult::Received, 5, 5, true),
            Some(ReceiveStopReason::AllReceived)
        );
    }
}
