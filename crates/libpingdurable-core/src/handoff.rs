//! Operator handoff between the send and receive phases
//!
//! This is a single blocking wait with no timeout. Input typed while sending
//! (including the keystroke that halted the send phase) is discarded first,
//! so only a line entered after the prompt releases the receive phase.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::console::{ConsoleRead, OperatorConsole};
use crate::signal::CancellationToken;

/// How the handoff ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffOutcome {
    /// The operator asked to start receiving (or input was closed)
    Proceed,
    /// A shutdown request arrived while waiting
    Cancelled,
}

/// Show `prompt` and block until the operator responds
pub fn wait_for_operator<C, W>(
    console: &mut C,
    cancel: &CancellationToken,
    prompt: &str,
    out: &mut W,
) -> HandoffOutcome
where
    C: OperatorConsole,
    W: Write,
{
    console.discard_pending();

    if cancel.is_cancelled() {
        return HandoffOutcome::Cancelled;
    }

    let _ = writeln!(out, "{}", prompt);
    let _ = out.flush();

    match console.read_line() {
        ConsoleRead::Line(_) => {
            debug!("operator released the receive phase");
            HandoffOutcome::Proceed
        }
        ConsoleRead::Eof => {
            info!("console input closed, proceeding to receive phase");
            HandoffOutcome::Proceed
        }
        ConsoleRead::Shutdown => HandoffOutcome::Cancelled,
    }
}
