// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background threads that drive the streaming drain and the budget monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use tessera_lanes::DrainOutcome;

use crate::error::ManagerError;
use crate::manager::Shared;

/// How long an idle drain waits for a wakeup before checking the queue again.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// The drain and monitor threads of a threaded manager.
pub(crate) struct Workers {
    running: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    shutdown_tx: Option<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Starts both threads.
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<Self, ManagerError> {
        let running = Arc::new(AtomicBool::new(true));
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let mut workers = Self {
            running: Arc::clone(&running),
            wake_tx,
            shutdown_tx: Some(shutdown_tx),
            handles: Vec::with_capacity(2),
        };

        let drain = {
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            let shutdown_rx = shutdown_rx.clone();
            thread::Builder::new()
                .name("tessera-drain".to_owned())
                .spawn(move || drain_loop(&shared, &running, &wake_rx, &shutdown_rx))
        };
        match drain {
            Ok(handle) => workers.handles.push(handle),
            Err(source) => {
                return Err(ManagerError::Spawn {
                    name: "drain",
                    source,
                })
            }
        }

        let monitor = thread::Builder::new()
            .name("tessera-monitor".to_owned())
            .spawn(move || monitor_loop(&shared, &running, &shutdown_rx));
        match monitor {
            Ok(handle) => workers.handles.push(handle),
            Err(source) => {
                workers.stop();
                return Err(ManagerError::Spawn {
                    name: "monitor",
                    source,
                });
            }
        }

        Ok(workers)
    }

    /// Nudges the drain thread. Never blocks.
    pub(crate) fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Stops both threads and waits for them to exit.
    ///
    /// A fetch already running completes first.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Disconnecting the shutdown channel wakes every sleeping worker.
        self.shutdown_tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("A resource manager worker panicked.");
            }
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps until the drain is woken or `timeout` elapses. Returns `false` on shutdown.
fn wait_for_work(wake_rx: &Receiver<()>, shutdown_rx: &Receiver<()>, timeout: Duration) -> bool {
    select! {
        recv(wake_rx) -> _ => true,
        recv(shutdown_rx) -> _ => false,
        default(timeout) => true,
    }
}

/// Sleeps for `timeout`. Returns `false` on shutdown.
fn sleep_unless_shutdown(shutdown_rx: &Receiver<()>, timeout: Duration) -> bool {
    select! {
        recv(shutdown_rx) -> _ => false,
        default(timeout) => true,
    }
}

fn drain_loop(
    shared: &Shared,
    running: &AtomicBool,
    wake_rx: &Receiver<()>,
    shutdown_rx: &Receiver<()>,
) {
    log::info!("Streaming drain thread started.");
    let drain_delay = shared.config().drain_delay();

    while running.load(Ordering::Relaxed) {
        let keep_going = match shared.drain_step() {
            DrainOutcome::Idle | DrainOutcome::Paused | DrainOutcome::Busy => {
                wait_for_work(wake_rx, shutdown_rx, IDLE_POLL)
            }
            // Yield between jobs so decodes never pile up.
            _ if drain_delay.is_zero() => true,
            _ => sleep_unless_shutdown(shutdown_rx, drain_delay),
        };
        if !keep_going {
            break;
        }
    }
    log::info!("Streaming drain thread stopped.");
}

fn monitor_loop(shared: &Shared, running: &AtomicBool, shutdown_rx: &Receiver<()>) {
    log::info!("Budget monitor thread started.");
    let interval = shared.config().monitor_interval();

    while running.load(Ordering::Relaxed) && sleep_unless_shutdown(shutdown_rx, interval) {
        if let Some(report) = shared.budget_check() {
            log::debug!(
                "Budget tick: {:.1}% used, severity {:?}",
                report.snapshot.worst_ratio() * 100.0,
                report.severity
            );
        }
    }
    log::info!("Budget monitor thread stopped.");
}
