// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Disk Monitor - Background poll loop
//
// Polls free space on a fixed interval and feeds the edge-triggered alert
// tracker. The loop sleeps in short bounded increments and watches a
// shutdown channel, mirroring the lifecycle sweep's cancellation shape.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::disk::{disk_status_of, AlertTracker};

/// How long the loop sleeps between shutdown checks.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Poll scheduling parameters.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between free-space polls. Defaults to one minute.
    pub poll_interval: Duration,
    /// Upper bound on how long `shutdown` waits for the thread to exit.
    pub join_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the running poll thread.
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl MonitorHandle {
    /// Spawn the poll loop over `root`, feeding `tracker`.
    pub fn spawn(root: PathBuf, tracker: Arc<AlertTracker>, config: MonitorConfig) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = config.poll_interval;

        let thread = thread::Builder::new()
            .name("opsvault-monitor".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "disk monitor started");
                let mut next_poll = Instant::now();
                loop {
                    match stop_rx.recv_timeout(SLEEP_SLICE.min(interval)) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            info!("disk monitor stopping");
                            return;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    if Instant::now() >= next_poll {
                        match disk_status_of(&root) {
                            Ok(status) => {
                                tracker.observe(&status);
                            }
                            Err(err) => {
                                error!(error = %err, "free-space poll failed");
                            }
                        }
                        next_poll = Instant::now() + interval;
                    }
                }
            })
            .expect("spawn monitor thread");

        Self {
            stop_tx,
            thread: Some(thread),
            join_timeout: config.join_timeout,
        }
    }

    /// Signal the loop to exit and join within the configured timeout.
    pub fn shutdown(mut self) -> bool {
        let _ = self.stop_tx.send(());
        let Some(handle) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("monitor thread did not stop within join timeout, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().is_ok()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
