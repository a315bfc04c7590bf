// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Lifecycle Manager - Background sweep task
//
// Runs the deletion sweep on a fixed interval in a dedicated thread. The
// thread sleeps in short bounded increments and watches a shutdown channel
// between them, so cancellation takes effect promptly instead of waiting
// out a long sleep. Shutdown signals the loop and joins with a bounded
// timeout.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::manager::LifecycleManager;

/// How long the loop sleeps between shutdown checks.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Sweep scheduling parameters.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweep runs. Defaults to one day.
    pub interval: Duration,
    /// Upper bound on how long `shutdown` waits for the thread to exit.
    pub join_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the running sweep thread.
#[derive(Debug)]
pub struct SweepHandle {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl SweepHandle {
    /// Spawn the sweep loop. The first sweep runs one full interval after
    /// spawn, then repeats on the interval.
    pub fn spawn(manager: Arc<LifecycleManager>, config: SweepConfig) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = config.interval;

        let thread = thread::Builder::new()
            .name("opsvault-sweep".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "sweep loop started");
                let mut next_run = Instant::now() + interval;
                loop {
                    let slice = SLEEP_SLICE.min(interval);
                    match stop_rx.recv_timeout(slice) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            info!("sweep loop stopping");
                            return;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    if Instant::now() >= next_run {
                        match manager.run_sweep_once() {
                            Ok(summary) => {
                                info!(
                                    checked = summary.checked,
                                    deleted = summary.deleted,
                                    skipped = summary.skipped,
                                    errors = summary.errors.len(),
                                    "scheduled sweep finished"
                                );
                            }
                            Err(err) => {
                                error!(error = %err, "scheduled sweep failed");
                            }
                        }
                        next_run = Instant::now() + interval;
                    }
                }
            })
            .expect("spawn sweep thread");

        Self {
            stop_tx,
            thread: Some(thread),
            join_timeout: config.join_timeout,
        }
    }

    /// Signal the loop to exit and join within the configured timeout.
    /// Returns false if the thread failed to stop in time (it is then
    /// detached, not killed).
    pub fn shutdown(mut self) -> bool {
        let _ = self.stop_tx.send(());
        let Some(handle) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + self.join_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("sweep thread did not stop within join timeout, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().is_ok()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        // Best-effort stop when the handle is dropped without an explicit
        // shutdown; the channel disconnect wakes the loop.
        let _ = self.stop_tx.send(());
    }
}
