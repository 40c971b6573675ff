//! Connection watchdog for producer sessions
//!
//! The store has no socket to drop, so "losing the connection" means the
//! queue directory going away underneath an open session. A background
//! thread polls for it and raises the session's failure flag.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use libpingdurable_core::ConnectionFailure;
use tracing::{debug, warn};

/// How often the watchdog checks the queue directory
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(200);

/// Handle to a running watchdog; stops the thread on drop
pub struct Watchdog {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Watch `dir` every `interval`, raising `failure` once it disappears
    pub fn spawn(dir: PathBuf, interval: Duration, failure: ConnectionFailure) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("store-watchdog".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !dir.is_dir() {
                            warn!(dir = %dir.display(), "queue directory vanished, raising connection failure");
                            failure.raise();
                            return;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!("watchdog stopped");
                        return;
                    }
                }
            });

        let join = match join {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to start store watchdog");
                None
            }
        };

        Self {
            stop: Some(stop_tx),
            join,
        }
    }

    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;

    #[test]
    fn test_raises_when_directory_removed() {
        let dir = tempdir().unwrap();
        let watched = dir.path().join("ping");
        std::fs::create_dir_all(&watched).unwrap();

        let failure = ConnectionFailure::new();
        let _watchdog = Watchdog::spawn(watched.clone(), Duration::from_millis(10), failure.clone());

        std::fs::remove_dir_all(&watched).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !failure.is_raised() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(failure.is_raised());
    }

    #[test]
    fn test_stop_leaves_flag_lowered() {
        let dir = tempdir().unwrap();
        let failure = ConnectionFailure::new();
        let mut watchdog =
            Watchdog::spawn(dir.path().to_path_buf(), Duration::from_millis(10), failure.clone());

        thread::sleep(Duration::from_millis(30));
        watchdog.stop();
        assert!(!failure.is_raised());
    }
}
