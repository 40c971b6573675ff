//! Shutdown signal hook
//!
//! The drivers are synchronous, so signals are awaited on a small
//! current-thread runtime living on its own thread. When one arrives the
//! cancellation token fires and the console is woken in case the operator
//! handoff is blocked reading input.

use std::sync::mpsc::Sender;
use std::thread;

use libpingdurable_core::{CancellationToken, ConsoleEvent};
use tracing::{info, warn};

/// Start listening for ctrl-c and SIGTERM
pub fn install(cancel: CancellationToken, console: Sender<ConsoleEvent>) -> std::io::Result<()> {
    thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "failed to start signal runtime, shutdown signals disabled");
                    return;
                }
            };

            runtime.block_on(shutdown_signal());
            info!("received shutdown signal");
            cancel.cancel();
            let _ = console.send(ConsoleEvent::Shutdown);
        })?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
