//! pingdurable - two-phase durable messaging check
//!
//! Sends messages until a limit, the operator or a connection failure stops
//! it, waits for the operator (who may restart the broker in between), then
//! drains the destination on a fresh session and reports any loss.

mod cli;
mod error;
mod output;
mod signals;

use std::io::Write;

use chrono::Utc;
use clap::Parser;
use libpingdurable_core::{
    wait_for_operator, CancellationToken, ChannelConsole, ConfigFile, HandoffOutcome,
    MemoryBroker, PingConfig, ReceiveDriver, RunReport, SendDriver, Transport,
};
use libpingdurable_store::StoreBroker;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{BrokerKind, Cli};
use error::Result;
use output::{ConsoleReporter, HANDOFF_PROMPT};

/// Exit status when a shutdown signal ended the run
const EXIT_SHUTDOWN: i32 = 130;

/// Exit status for lost messages under `--strict`
const EXIT_LOSS: i32 = 2;

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!(code = e.error_code(), "{}", e);
            eprintln!("error: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<i32> {
    let file = cli.config.as_deref().map(ConfigFile::load).transpose()?;
    let config = PingConfig::build(file.as_ref(), &cli.overrides())?;
    info!(?config, "configuration loaded");

    let (mut console, console_tx) = ChannelConsole::stdin();
    let cancel = CancellationToken::new();
    signals::install(cancel.clone(), console_tx)?;

    match cli.broker {
        BrokerKind::Memory => {
            let broker = MemoryBroker::new();
            run_phases(cli, &config, &broker, &mut console, &cancel)
        }
        BrokerKind::Store => {
            let broker = StoreBroker::new(cli.store_root());
            info!(root = %broker.root().display(), "using on-disk queues");
            run_phases(cli, &config, &broker, &mut console, &cancel)
        }
    }
}

fn run_phases<T: Transport>(
    cli: &Cli,
    config: &PingConfig,
    transport: &T,
    console: &mut ChannelConsole,
    cancel: &CancellationToken,
) -> Result<i32> {
    let started_at = Utc::now();
    let mut out = std::io::stdout();
    let mut reporter = ConsoleReporter::new(std::io::stdout(), config.transacted);

    output::send_banner(&mut out, config)?;
    let send = SendDriver::new(config, transport, cancel.clone()).run(console, &mut reporter)?;
    output::send_summary(&mut out, &send)?;

    let handoff = wait_for_operator(console, cancel, HANDOFF_PROMPT, &mut out);

    let receive = match handoff {
        HandoffOutcome::Proceed => {
            let outcome = ReceiveDriver::new(config, transport, cancel.clone())
                .run(send.sent(), &mut reporter)?;
            output::receive_summary(&mut out, &outcome)?;
            Some(outcome)
        }
        HandoffOutcome::Cancelled => {
            info!("shutdown requested, skipping receive phase");
            None
        }
    };

    let report = RunReport::new(config, started_at, send, handoff, receive);

    if let Some(ref path) = cli.json_report {
        report.write_json(path)?;
        writeln!(out, "Report saved to {}", path.display())?;
    }
    output::run_summary(&mut out, &report)?;
    out.flush()?;

    Ok(exit_code(&report, cli.strict, cancel.is_cancelled()))
}

fn exit_code(report: &RunReport, strict: bool, cancelled: bool) -> i32 {
    if cancelled {
        EXIT_SHUTDOWN
    } else if strict && report.lost {
        EXIT_LOSS
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libpingdurable_core::batch::BatchCounts;
    use libpingdurable_core::metrics::LatencyPercentiles;
    use libpingdurable_core::{ReceiveOutcome, ReceiveStopReason, SendOutcome, SendStopReason};
    use std::time::Duration;

    fn report(received: u64) -> RunReport {
        let send = SendOutcome {
            reason: SendStopReason::CountReached,
            counts: BatchCounts {
                sent: 10,
                committed: 10,
                not_committed: 0,
            },
            elapsed: Duration::from_secs(1),
            latency: LatencyPercentiles::default(),
            error: None,
        };
        let receive = ReceiveOutcome {
            reason: if received == 10 {
                ReceiveStopReason::AllReceived
            } else {
                ReceiveStopReason::IdleTimeout
            },
            received,
            expected: 10,
            elapsed: Duration::from_secs(1),
            error: None,
        };
        RunReport::new(
            &PingConfig::default(),
            Utc::now(),
            send,
            HandoffOutcome::Proceed,
            Some(receive),
        )
    }

    #[test]
    fn test_loss_only_fails_when_strict() {
        assert_eq!(exit_code(&report(7), false, false), 0);
        assert_eq!(exit_code(&report(7), true, false), EXIT_LOSS);
        assert_eq!(exit_code(&report(10), true, false), 0);
    }

    #[test]
    fn test_shutdown_wins() {
        assert_eq!(exit_code(&report(7), true, true), EXIT_SHUTDOWN);
    }
}
