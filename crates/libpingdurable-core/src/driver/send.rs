//! Send phase: INIT → SENDING → HALTED → CLOSED

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::PhaseObserver;
use crate::batch::{BatchCounts, CommitBatcher};
use crate::condition::{evaluate_send, SendLimits, SendSignals, SendStopReason};
use crate::config::PingConfig;
use crate::console::OperatorConsole;
use crate::error::TransportError;
use crate::metrics::{LatencyPercentiles, LatencyRecorder};
use crate::signal::{CancellationToken, ConnectionFailure};
use crate::throttle::Throttle;
use crate::transport::{Message, ProducerSession, Transport};

/// Result of the send phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub reason: SendStopReason,
    #[serde(flatten)]
    pub counts: BatchCounts,
    #[serde(with = "crate::report::serde_duration")]
    pub elapsed: Duration,
    pub latency: LatencyPercentiles,
    /// Message of the publish failure that ended the phase, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    /// Messages successfully published; the receive phase expects this many
    pub fn sent(&self) -> u64 {
        self.counts.sent
    }
}

/// Drives the publish loop against a transport
pub struct SendDriver<'a, T: Transport> {
    config: &'a PingConfig,
    transport: &'a T,
    cancel: CancellationToken,
}

impl<'a, T: Transport> SendDriver<'a, T> {
    pub fn new(config: &'a PingConfig, transport: &'a T, cancel: CancellationToken) -> Self {
        Self {
            config,
            transport,
            cancel,
        }
    }

    /// Run the send phase.
    ///
    /// Only a failure to open the producing session is returned as an error;
    /// publish failures end the phase with `ConnectionError`.
    pub fn run<C, O>(&self, console: &mut C, observer: &mut O) -> Result<SendOutcome, TransportError>
    where
        C: OperatorConsole,
        O: PhaseObserver,
    {
        debug!(
            num_messages = self.config.num_messages,
            duration_ms = self.config.duration.as_millis() as u64,
            rate = self.config.rate,
            "starting send phase"
        );

        let failure = ConnectionFailure::new();
        let mut session = self
            .transport
            .open_producer(&self.config.session_options(), failure.clone())?;

        let template = Message::template(self.config.message_size, self.config.persistent);
        console.discard_pending();

        let outcome = self.pump(&mut session, &template, &failure, console, observer);

        info!(
            sent = outcome.counts.sent,
            committed = outcome.counts.committed,
            not_committed = outcome.counts.not_committed,
            reason = ?outcome.reason,
            "send phase halted"
        );

        if let Err(e) = session.close() {
            warn!(error = %e, "ignoring error while closing producer session");
        }

        Ok(outcome)
    }

    fn pump<S, C, O>(
        &self,
        session: &mut S,
        template: &Message,
        failure: &ConnectionFailure,
        console: &mut C,
        observer: &mut O,
    ) -> SendOutcome
    where
        S: ProducerSession,
        C: OperatorConsole,
        O: PhaseObserver,
    {
        let limits = SendLimits {
            target_count: self.config.num_messages,
            max_duration: self.config.duration,
        };
        let mut batcher = CommitBatcher::new(self.config.effective_batch_size());
        let mut throttle = Throttle::new(self.config.rate);
        let mut latency = LatencyRecorder::new();
        let mut error = None;
        let start = Instant::now();

        let reason = loop {
            let publish_start = Instant::now();
            match session.publish(template) {
                Ok(committed) => {
                    latency.record(publish_start.elapsed());
                    if batcher.record_send(committed).is_some() {
                        observer.on_commit(batcher.committed());
                    }
                    throttle.wait(&self.cancel);
                }
                Err(e) => {
                    debug!(error = %e, sent = batcher.sent(), "publish failed");
                    failure.raise();
                    error = Some(e.to_string());
                }
            }

            let signals = SendSignals {
                operator_interrupt: console.has_pending_input(),
                connection_error: failure.is_raised(),
                shutdown: self.cancel.is_cancelled(),
            };

            if let Some(reason) = evaluate_send(&limits, start.elapsed(), batcher.sent(), &signals) {
                break reason;
            }
        };

        if reason == SendStopReason::OperatorInterrupt {
            console.discard_pending();
        }
        observer.on_send_halted(reason);

        SendOutcome {
            reason,
            counts: batcher.counts(),
            elapsed: start.elapsed(),
            latency: latency.percentiles(),
            error,
        }
    }
}
