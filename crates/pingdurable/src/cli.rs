use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use libpingdurable_core::ConfigOverrides;

/// Which broker the phases run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrokerKind {
    /// On-disk queues that survive process restarts
    Store,
    /// In-process queues, gone when the process exits
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "pingdurable")]
#[command(about = "Send a stream of messages, wait for the operator, then check they all come back")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file with a [ping] table
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of messages to send, 0 for no limit [default: 100]
    #[arg(short = 'n', long)]
    pub num_messages: Option<u64>,

    /// Maximum send time as dDhHmMsS, e.g. 30S or 1H30M, 0 for no limit [default: 30S]
    #[arg(short = 'd', long)]
    pub duration: Option<String>,

    /// Messages per second, 0 for unthrottled [default: 20]
    #[arg(short = 'r', long)]
    pub rate: Option<u32>,

    /// Messages per transaction commit [default: 10]
    #[arg(short = 'b', long)]
    pub commit_batch_size: Option<u32>,

    /// Payload size in bytes [default: 0]
    #[arg(short = 's', long)]
    pub message_size: Option<usize>,

    /// Publish inside transactions [default: true]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub transacted: Option<bool>,

    /// Request persistent delivery [default: true]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub persistent: Option<bool>,

    /// Destination queue name [default: ping]
    #[arg(short = 'q', long)]
    pub queue: Option<String>,

    /// Idle timeout for each receive as dDhHmMsS [default: 3S]
    #[arg(long)]
    pub receive_timeout: Option<String>,

    /// Broker to run against
    #[arg(long, value_enum, default_value_t = BrokerKind::Store)]
    pub broker: BrokerKind,

    /// Root directory for on-disk queues (defaults to a pingdurable directory under the system temp dir)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    pub json_report: Option<PathBuf>,

    /// Exit with status 2 when fewer messages come back than were sent
    #[arg(long)]
    pub strict: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// The command-line configuration layer
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            num_messages: self.num_messages,
            duration: self.duration.clone(),
            rate: self.rate,
            commit_batch_size: self.commit_batch_size,
            message_size: self.message_size,
            transacted: self.transacted,
            persistent: self.persistent,
            queue: self.queue.clone(),
            receive_timeout: self.receive_timeout.clone(),
        }
    }

    pub fn store_root(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pingdurable"))
    }
}
