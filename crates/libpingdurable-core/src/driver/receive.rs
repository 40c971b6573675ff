//! Receive phase: INIT → RECEIVING → DONE → CLOSED

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::PhaseObserver;
use crate::condition::{evaluate_receive, PullResult, ReceiveStopReason};
use crate::config::PingConfig;
use crate::error::TransportError;
use crate::signal::CancellationToken;
use crate::transport::{ConsumerSession, Transport};

/// Result of the receive phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveOutcome {
    pub reason: ReceiveStopReason,
    pub received: u64,
    pub expected: u64,
    #[serde(with = "crate::report::serde_duration")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReceiveOutcome {
    /// Every confirmed-sent message came back
    pub fn is_complete(&self) -> bool {
        self.reason == ReceiveStopReason::AllReceived
    }

    /// The consumer went idle before the expected count arrived
    pub fn is_loss(&self) -> bool {
        self.reason == ReceiveStopReason::IdleTimeout && self.received < self.expected
    }

    /// Messages still outstanding when the phase stopped
    pub fn missing(&self) -> u64 {
        self.expected.saturating_sub(self.received)
    }
}

/// Drains the destination on a brand-new consumer session
pub struct ReceiveDriver<'a, T: Transport> {
    config: &'a PingConfig,
    transport: &'a T,
    cancel: CancellationToken,
}

impl<'a, T: Transport> ReceiveDriver<'a, T> {
    pub fn new(config: &'a PingConfig, transport: &'a T, cancel: CancellationToken) -> Self {
        Self {
            config,
            transport,
            cancel,
        }
    }

    /// Pull until `expected` messages arrived or a pull idles out.
    ///
    /// Only a failure to open the consuming session is returned as an error.
    pub fn run<O: PhaseObserver>(
        &self,
        expected: u64,
        observer: &mut O,
    ) -> Result<ReceiveOutcome, TransportError> {
        debug!(expected, timeout_ms = self.config.receive_timeout.as_millis() as u64, "starting receive phase");

        let mut session = self.transport.open_consumer(&self.config.session_options())?;
        let outcome = self.drain(&mut session, expected);
        observer.on_receive_halted(outcome.reason);

        info!(
            received = outcome.received,
            expected,
            reason = ?outcome.reason,
            "receive phase halted"
        );

        if let Err(e) = session.close() {
            warn!(error = %e, "ignoring error while closing consumer session");
        }

        Ok(outcome)
    }

    fn drain<S: ConsumerSession>(&self, session: &mut S, expected: u64) -> ReceiveOutcome {
        let start = Instant::now();
        let mut received = 0u64;
        let mut error = None;

        let reason = if expected == 0 {
            ReceiveStopReason::AllReceived
        } else {
            loop {
                let pull = match session.receive(self.config.receive_timeout) {
                    Ok(Some(_)) => {
                        received += 1;
                        PullResult::Received
                    }
                    Ok(None) => PullResult::TimedOut,
                    Err(e) => {
                        debug!(error = %e, received, "receive failed");
                        error = Some(e.to_string());
                        PullResult::Failed
                    }
                };

                if let Some(reason) =
                    evaluate_receive(pull, received, expected, self.cancel.is_cancelled())
                {
                    break reason;
                }
            }
        };

        ReceiveOutcome {
            reason,
            received,
            expected,
            elapsed: start.elapsed(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBroker;
    use crate::transport::Message;

    fn config() -> PingConfig {
        PingConfig {
            receive_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_received() {
        let broker = MemoryBroker::new();
        broker.enqueue("ping", (0..8).map(|_| Message::template(4, true)));
        let cfg = config();

        let outcome = ReceiveDriver::new(&cfg, &broker, CancellationToken::new())
            .run(8, &mut ())
            .unwrap();

        assert_eq!(outcome.reason, ReceiveStopReason::AllReceived);
        assert_eq!(outcome.received, 8);
        assert!(outcome.is_complete());
        assert!(!outcome.is_loss());
        assert!(!broker.has_open_session());
    }

    #[test]
    fn test_shortfall_reports_idle_timeout() {
        let broker = MemoryBroker::new();
        broker.enqueue("ping", (0..3).map(|_| Message::template(0, true)));
        let cfg = config();

        let outcome = ReceiveDriver::new(&cfg, &broker, CancellationToken::new())
            .run(5, &mut ())
            .unwrap();

        assert_eq!(outcome.reason, ReceiveStopReason::IdleTimeout);
        assert_eq!(outcome.received, 3);
        assert!(outcome.is_loss());
        assert_eq!(outcome.missing(), 2);
    }

    #[test]
    fn test_stops_at_target_leaving_extra_messages() {
        let broker = MemoryBroker::new();
        broker.enqueue("ping", (0..5).map(|_| Message::template(0, true)));
        let cfg = config();

        let outcome = ReceiveDriver::new(&cfg, &broker, CancellationToken::new())
            .run(3, &mut ())
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(broker.queue_depth("ping"), 2);
    }

    #[test]
    fn test_zero_target_completes_without_pulling() {
        let broker = MemoryBroker::new();
        broker.enqueue("ping", [Message::template(0, true)]);
        let cfg = config();

        let outcome = ReceiveDriver::new(&cfg, &broker, CancellationToken::new())
            .run(0, &mut ())
            .unwrap();

        assert_eq!(outcome.reason, ReceiveStopReason::AllReceived);
        assert_eq!(outcome.received, 0);
        assert_eq!(broker.queue_depth("ping"), 1);
    }

    #[test]
    fn test_idle_timer_resets_after_each_receive() {
        let broker = MemoryBroker::new();
        let feeder = broker.clone();
        let cfg = PingConfig {
            receive_timeout: Duration::from_millis(200),
            ..Default::default()
        };

        // Total feed time exceeds one idle timeout, each gap does not.
        let handle = std::thread::spawn(move || {
            for _ in 0..4 {
                std::thread::sleep(Duration::from_millis(80));
                feeder.enqueue("ping", [Message::template(0, true)]);
            }
        });

        let outcome = ReceiveDriver::new(&cfg, &broker, CancellationToken::new())
            .run(4, &mut ())
            .unwrap();
        handle.join().unwrap();

        assert_eq!(outcome.reason, ReceiveStopReason::AllReceived);
        assert_eq!(outcome.received, 4);
    }

    #[test]
    fn test_sever_during_pull_reports_connection_error() {
        let broker = MemoryBroker::new();
        broker.enqueue("ping", (0..2).map(|_| Message::template(0, true)));
        let remote = broker.clone();
        let cfg = PingConfig {
            receive_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        // Severed while the third pull is blocked waiting
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.sever();
        });

        let start = Instant::now();
        let outcome = ReceiveDriver::new(&cfg, &broker, CancellationToken::new())
            .run(5, &mut ())
            .unwrap();
        handle.join().unwrap();

        assert_eq!(outcome.reason, ReceiveStopReason::ConnectionError);
        assert_eq!(outcome.received, 2);
        assert!(outcome.error.is_some());
        assert!(!outcome.is_loss());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!broker.has_open_session());
    }

    #[test]
    fn test_shutdown_stops_after_current_pull() {
        let broker = MemoryBroker::new();
        broker.enqueue("ping", (0..5).map(|_| Message::template(0, true)));
        let cfg = config();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = ReceiveDriver::new(&cfg, &broker, token).run(10, &mut ()).unwrap();

        assert_eq!(outcome.reason, ReceiveStopReason::Shutdown);
        assert_eq!(outcome.received, 1);
        assert_eq!(broker.queue_depth("ping"), 4);
        assert!(!broker.has_open_session());
    }
}
