//! Operator-facing output on stdout

use std::io::Write;

use libpingdurable_core::driver::PhaseObserver;
use libpingdurable_core::{
    PingConfig, ReceiveOutcome, ReceiveStopReason, RunReport, SendOutcome, SendStopReason,
};

pub const HANDOFF_PROMPT: &str = "Press return to begin receiving the pings.";

/// Prints commit progress and halt lines as the phases run.
///
/// Commit progress is only shown for transacted runs; every publish commits otherwise.
pub struct ConsoleReporter<W: Write> {
    out: W,
    transacted: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, transacted: bool) -> Self {
        Self { out, transacted }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PhaseObserver for ConsoleReporter<W> {
    fn on_commit(&mut self, committed_total: u64) {
        if !self.transacted {
            return;
        }
        let _ = writeln!(self.out, "Committed: {}", committed_total);
    }

    fn on_send_halted(&mut self, reason: SendStopReason) {
        let _ = writeln!(self.out, "{}", reason.describe());
    }

    fn on_receive_halted(&mut self, reason: ReceiveStopReason) {
        let _ = writeln!(self.out, "{}", reason.describe());
    }
}

/// Announce the limits the send phase runs under
pub fn send_banner<W: Write>(out: &mut W, config: &PingConfig) -> std::io::Result<()> {
    if !config.duration.is_zero() {
        writeln!(
            out,
            "Sending for up to {:.1} seconds.",
            config.duration.as_secs_f64()
        )?;
    }
    if config.rate > 0 {
        writeln!(out, "Sending at {} messages per second.", config.rate)?;
    }
    if config.num_messages > 0 {
        writeln!(out, "Sending up to {} messages.", config.num_messages)?;
    }
    Ok(())
}

pub fn send_summary<W: Write>(out: &mut W, outcome: &SendOutcome) -> std::io::Result<()> {
    writeln!(
        out,
        "Messages sent: {}, Messages Committed = {}, Messages not Committed = {}",
        outcome.counts.sent, outcome.counts.committed, outcome.counts.not_committed
    )
}

pub fn receive_summary<W: Write>(out: &mut W, outcome: &ReceiveOutcome) -> std::io::Result<()> {
    writeln!(out, "Messages received: {}", outcome.received)?;
    if outcome.received < outcome.expected {
        writeln!(
            out,
            "Lost {} of {} sent messages.",
            outcome.missing(),
            outcome.expected
        )?;
    }
    Ok(())
}

/// Final results block
pub fn run_summary<W: Write>(out: &mut W, report: &RunReport) -> std::io::Result<()> {
    let send = &report.send;
    writeln!(out)?;
    writeln!(out, "=== RESULTS ===")?;
    writeln!(
        out,
        "Send: {} sent in {:.2}s ({:?})",
        send.sent(),
        send.elapsed.as_secs_f64(),
        send.reason
    )?;
    if send.latency.samples > 0 {
        writeln!(
            out,
            "Publish latency: P50={:.2}ms P95={:.2}ms P99={:.2}ms max={:.2}ms",
            send.latency.p50_ms(),
            send.latency.p95_ms(),
            send.latency.p99_ms(),
            send.latency.max_ms()
        )?;
    }
    match report.receive {
        Some(ref receive) => writeln!(
            out,
            "Receive: {}/{} in {:.2}s ({:?})",
            receive.received,
            receive.expected,
            receive.elapsed.as_secs_f64(),
            receive.reason
        )?,
        None => writeln!(out, "Receive: skipped")?,
    }
    if report.lost {
        writeln!(out, "Result: MESSAGES LOST")?;
    } else {
        writeln!(out, "Result: ok")?;
    }
    Ok(())
}
