//! Operator console input
//!
//! Console lines are read on a background thread and delivered through a
//! channel, which gives the send driver a non-blocking "is anything pending"
//! check and the handoff a blocking read. The shutdown hook pushes a
//! `Shutdown` event into the same channel so a blocked handoff wakes up.

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use tracing::{debug, warn};

/// Input delivered to the console channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// A line typed by the operator
    Line(String),
    /// Standard input was closed
    Eof,
    /// The process received a shutdown request
    Shutdown,
}

/// What the blocking read at the handoff produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleRead {
    Line(String),
    Eof,
    Shutdown,
}

/// Console operations the drivers and the handoff rely on
pub trait OperatorConsole {
    /// Non-blocking check for a pending operator line
    fn has_pending_input(&mut self) -> bool;

    /// Drop every buffered operator line
    fn discard_pending(&mut self);

    /// Block until the operator enters a line, input closes, or shutdown
    fn read_line(&mut self) -> ConsoleRead;
}

/// Console backed by an event channel
pub struct ChannelConsole {
    rx: Receiver<ConsoleEvent>,
    buffered: VecDeque<ConsoleEvent>,
    closed: bool,
}

impl ChannelConsole {
    /// Wrap an existing event channel
    pub fn new(rx: Receiver<ConsoleEvent>) -> Self {
        Self {
            rx,
            buffered: VecDeque::new(),
            closed: false,
        }
    }

    /// Start reading standard input on a background thread.
    ///
    /// Returns the console and a sender the shutdown hook can use to wake it.
    pub fn stdin() -> (Self, Sender<ConsoleEvent>) {
        let (tx, rx) = mpsc::channel();
        let reader_tx = tx.clone();

        if let Err(e) = thread::Builder::new()
            .name("console-reader".to_string())
            .spawn(move || read_stdin(reader_tx))
        {
            warn!(error = %e, "failed to start console reader, operator input disabled");
        }

        (Self::new(rx), tx)
    }

    fn pump(&mut self) {
        if self.closed {
            return;
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.buffered.push_back(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

impl OperatorConsole for ChannelConsole {
    fn has_pending_input(&mut self) -> bool {
        self.pump();
        self.buffered
            .iter()
            .any(|event| matches!(event, ConsoleEvent::Line(_)))
    }

    fn discard_pending(&mut self) {
        self.pump();
        let before = self.buffered.len();
        self.buffered
            .retain(|event| !matches!(event, ConsoleEvent::Line(_)));
        let dropped = before - self.buffered.len();
        if dropped > 0 {
            debug!(dropped, "discarded buffered console input");
        }
    }

    fn read_line(&mut self) -> ConsoleRead {
        if let Some(event) = self.buffered.pop_front() {
            return event.into();
        }
        if self.closed {
            return ConsoleRead::Eof;
        }
        match self.rx.recv() {
            Ok(event) => event.into(),
            Err(_) => {
                self.closed = true;
                ConsoleRead::Eof
            }
        }
    }
}

impl From<ConsoleEvent> for ConsoleRead {
    fn from(event: ConsoleEvent) -> Self {
        match event {
            ConsoleEvent::Line(line) => ConsoleRead::Line(line),
            ConsoleEvent::Eof => ConsoleRead::Eof,
            ConsoleEvent::Shutdown => ConsoleRead::Shutdown,
        }
    }
}

fn read_stdin(tx: Sender<ConsoleEvent>) {
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    let mut line = String::new();

    loop {
        line.clear();
        match lock.read_line(&mut line) {
            Ok(0) | Err(_) => {
                let _ = tx.send(ConsoleEvent::Eof);
                return;
            }
            Ok(_) => {
                let text = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(ConsoleEvent::Line(text)).is_err() {
                    return;
                }
            }
        }
    }
}
