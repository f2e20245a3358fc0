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

//! The resource manager context object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tessera_core::config::WorkerMode;
use tessera_core::{
    HostRuntime, ManagerConfig, Notification, NotificationBus, ResourceKind, ResourcePayload,
    ResourceSource, Severity, TaskState, Vec3,
};
use tessera_data::{BudgetSnapshot, StoreSet, StoreStats};
use tessera_lanes::{
    CleanupLane, DrainOutcome, LodDecision, LodLane, RequestOptions, ResourceHandle,
    StreamingLane,
};
use tessera_telemetry::{BudgetMonitor, MonitorDiagnostics, TickReport};

use crate::error::ManagerError;
use crate::state::ManagerState;
use crate::workers::Workers;

/// A point-in-time view of the manager's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerDiagnostics {
    /// Lifecycle state.
    pub state: ManagerState,
    /// Whether the host is backgrounded.
    pub backgrounded: bool,
    /// Jobs waiting in the streaming queue.
    pub pending_jobs: usize,
    /// Budget monitor counters.
    pub monitor: MonitorDiagnostics,
    /// Per-store statistics, in [`ResourceKind::ALL`] order.
    pub stores: Vec<StoreStats>,
}

/// State shared between the manager and its worker threads.
pub(crate) struct Shared {
    config: ManagerConfig,
    state: Mutex<ManagerState>,
    stores: StoreSet,
    streaming: StreamingLane,
    lod: LodLane,
    cleanup: Arc<CleanupLane>,
    monitor: BudgetMonitor,
    source: Arc<dyn ResourceSource>,
    bus: Arc<NotificationBus>,
    viewpoint: Mutex<Option<Vec3>>,
    backgrounded: AtomicBool,
}

impl Shared {
    pub(crate) fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ManagerState {
        *lock(&self.state)
    }

    fn require_running(&self) -> Result<(), ManagerError> {
        match self.state() {
            ManagerState::Running => Ok(()),
            state => Err(ManagerError::NotRunning { state }),
        }
    }

    fn transition(&self, to: ManagerState) -> Result<ManagerState, ManagerError> {
        let mut state = lock(&self.state);
        let from = *state;
        if !from.can_transition_to(to) {
            return Err(ManagerError::InvalidTransition { from, to });
        }
        log::debug!("Resource manager: {from} → {to}");
        *state = to;
        Ok(from)
    }

    /// Runs one streaming job if the manager is running.
    pub(crate) fn drain_step(&self) -> DrainOutcome {
        if self.state() != ManagerState::Running {
            return DrainOutcome::Idle;
        }
        self.streaming
            .drain_one(&self.stores, self.source.as_ref(), &self.bus)
    }

    /// Runs one monitor tick if the manager is running.
    pub(crate) fn budget_check(&self) -> Option<TickReport> {
        if self.state() != ManagerState::Running {
            return None;
        }
        Some(self.monitor.tick(&self.stores))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps resident resource memory under a configurable ceiling while
/// streaming resources in progressively.
///
/// One manager is constructed per process and passed by reference to its
/// collaborators. Requests never block: a miss returns a placeholder
/// immediately and schedules the upgrade on the streaming drain.
///
/// With [`WorkerMode::Threaded`] a drain thread and a monitor thread run while
/// the manager is [`Running`](ManagerState::Running). With
/// [`WorkerMode::Manual`] the host pumps [`drain_pending`](Self::drain_pending)
/// and [`run_budget_check`](Self::run_budget_check) from its own loop.
pub struct ResourceManager {
    shared: Arc<Shared>,
    workers: Mutex<Option<Workers>>,
}

impl ResourceManager {
    /// Creates a manager in the [`Uninitialized`](ManagerState::Uninitialized) state.
    pub fn new(
        config: ManagerConfig,
        source: Arc<dyn ResourceSource>,
        host: Arc<dyn HostRuntime>,
    ) -> Result<Self, ManagerError> {
        config.validate()?;

        let bus = Arc::new(NotificationBus::new());
        let cleanup = Arc::new(CleanupLane::new(
            config.thresholds,
            config.fractions,
            config.reclaim_retry_delay(),
            Arc::clone(&host),
            Arc::clone(&bus),
        ));
        let monitor = BudgetMonitor::new(&config, Arc::clone(&cleanup), host, Arc::clone(&bus));

        let shared = Shared {
            stores: StoreSet::new(&config),
            streaming: StreamingLane::new(config.expiry),
            lod: LodLane::new(config.lod),
            cleanup,
            monitor,
            source,
            bus,
            state: Mutex::new(ManagerState::Uninitialized),
            viewpoint: Mutex::new(None),
            backgrounded: AtomicBool::new(false),
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
            workers: Mutex::new(None),
        })
    }

    /// Starts the manager. Spawns the workers in threaded mode and publishes
    /// [`Notification::Initialized`].
    pub fn initialize(&self) -> Result<(), ManagerError> {
        self.shared.transition(ManagerState::Initializing)?;

        if self.shared.config.worker_mode == WorkerMode::Threaded {
            match Workers::spawn(Arc::clone(&self.shared)) {
                Ok(workers) => *lock(&self.workers) = Some(workers),
                Err(error) => {
                    *lock(&self.shared.state) = ManagerState::Disposed;
                    return Err(error);
                }
            }
        }

        self.shared.transition(ManagerState::Running)?;
        log::info!(
            "Resource manager running ({:?} workers, {} byte limit)",
            self.shared.config.worker_mode,
            self.shared.config.total_limit_bytes
        );
        self.shared.bus.publish(Notification::Initialized);
        Ok(())
    }

    /// Returns the cached entry for `key`, or inserts a placeholder and
    /// schedules its upgrade.
    ///
    /// A key cached under another kind is refused with
    /// [`ManagerError::KindMismatch`].
    ///
    /// Never blocks on a fetch. When any usage ratio is at or above the
    /// standard threshold, a standard cleanup pass runs before the placeholder
    /// is admitted. When `options` carries an anchor and a viewpoint is known,
    /// the upgrade target is capped by the distance tier.
    pub fn request_resource(
        &self,
        key: &str,
        kind: ResourceKind,
        options: RequestOptions,
    ) -> Result<ResourceHandle, ManagerError> {
        let shared = &self.shared;
        shared.require_running()?;

        if let Some(handle) = shared.streaming.lookup(&shared.stores, key, kind) {
            return Ok(handle);
        }
        if let Some(cached) = shared.stores.find(key) {
            return Err(ManagerError::KindMismatch {
                key: key.to_owned(),
                cached: cached.kind,
                requested: kind,
            });
        }

        let snapshot = shared.monitor.snapshot(&shared.stores);
        shared.monitor.observe(&snapshot);
        if shared.cleanup.needs_admission_cleanup(&snapshot) {
            let report = shared
                .cleanup
                .run(&shared.stores, Severity::Standard, snapshot.worst_ratio());
            shared.monitor.record_admission_cleanup(&report);
        }

        let viewpoint = *lock(&shared.viewpoint);
        let target = match (options.anchor, viewpoint) {
            (Some(anchor), Some(viewpoint)) if anchor.is_finite() => {
                options.max_tier.min(shared.lod.tier_for(viewpoint, anchor))
            }
            _ => options.max_tier,
        };

        let handle = shared
            .streaming
            .admit(&shared.stores, key, kind, &options, target);
        self.wake_drain();
        Ok(handle)
    }

    /// Re-evaluates the tier of `key` for a viewer at `viewpoint`, and
    /// remembers the viewpoint for later requests.
    ///
    /// A viewpoint with a NaN or infinite component is rejected and leaves
    /// every tier untouched.
    pub fn reevaluate_lod(&self, key: &str, viewpoint: Vec3) -> Result<LodDecision, ManagerError> {
        let shared = &self.shared;
        shared.require_running()?;
        self.set_viewpoint(viewpoint)?;

        let decision = shared
            .lod
            .reevaluate(&shared.stores, &shared.streaming, key, viewpoint);
        if matches!(decision, LodDecision::Enqueued(_)) {
            self.wake_drain();
        }
        Ok(decision)
    }

    /// Records the viewer position used to cap new requests.
    pub fn set_viewpoint(&self, viewpoint: Vec3) -> Result<(), ManagerError> {
        if !viewpoint.is_finite() {
            return Err(ManagerError::NonFiniteViewpoint(viewpoint));
        }
        *lock(&self.shared.viewpoint) = Some(viewpoint);
        Ok(())
    }

    /// The last recorded viewer position.
    pub fn viewpoint(&self) -> Option<Vec3> {
        *lock(&self.shared.viewpoint)
    }

    /// Current usage across every store.
    pub fn budget_snapshot(&self) -> BudgetSnapshot {
        self.shared.monitor.snapshot(&self.shared.stores)
    }

    /// Runs `f` against the payload cached for `key`. Counts as a use.
    pub fn with_payload<R>(&self, key: &str, f: impl FnOnce(&dyn ResourcePayload) -> R) -> Option<R> {
        let store = self.shared.stores.iter().find(|store| store.contains(key))?;
        store
            .with_entry(key, |entry| entry.payload().map(|payload| f(payload)))
            .flatten()
    }

    /// Removes `key` from the cache and drops its queued job, if any.
    pub fn invalidate(&self, key: &str) -> bool {
        let shared = &self.shared;
        shared.streaming.cancel(key, TaskState::Dropped);
        let removed = shared.stores.iter().any(|store| store.invalidate(key));
        if removed {
            log::debug!("Invalidated '{key}'");
        }
        removed
    }

    /// Empties every store and drops every queued job.
    pub fn clear_all(&self) -> usize {
        let dropped = self.shared.streaming.drop_all();
        let removed = self.shared.stores.clear_all();
        log::info!("Cleared {removed} entries and {dropped} queued jobs");
        removed
    }

    /// Tells the manager the host moved to, or returned from, the background.
    ///
    /// Backgrounding pauses the drain and runs an aggressive cleanup pass;
    /// foregrounding resumes the drain.
    pub fn set_backgrounded(&self, backgrounded: bool) {
        let shared = &self.shared;
        if shared.backgrounded.swap(backgrounded, Ordering::AcqRel) == backgrounded {
            return;
        }

        if backgrounded {
            shared.streaming.pause();
            if shared.state() == ManagerState::Running {
                let ratio = shared.monitor.snapshot(&shared.stores).worst_ratio();
                shared
                    .cleanup
                    .run(&shared.stores, Severity::Aggressive, ratio);
            }
            log::info!("Host backgrounded: streaming paused");
        } else {
            shared.streaming.resume();
            self.wake_drain();
            log::info!("Host foregrounded: streaming resumed");
        }
        shared.bus.publish(Notification::Backgrounded(backgrounded));
    }

    /// Returns `true` while backgrounded.
    pub fn is_backgrounded(&self) -> bool {
        self.shared.backgrounded.load(Ordering::Acquire)
    }

    /// A copy of the manager's counters.
    pub fn diagnostics(&self) -> ManagerDiagnostics {
        let shared = &self.shared;
        ManagerDiagnostics {
            state: shared.state(),
            backgrounded: self.is_backgrounded(),
            pending_jobs: shared.streaming.pending_len(),
            monitor: shared.monitor.diagnostics(),
            stores: shared.stores.iter().map(|store| store.stats()).collect(),
        }
    }

    /// Subscribes to the manager's notifications.
    pub fn subscribe(&self) -> flume::Receiver<Notification> {
        self.shared.bus.subscribe()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.shared.state()
    }

    /// Runs the next streaming job, if running and not paused.
    ///
    /// Returns [`DrainOutcome::Busy`] while the drain thread, or another
    /// caller, is running a job.
    pub fn drain_next(&self) -> DrainOutcome {
        self.shared.drain_step()
    }

    /// Runs queued jobs until the queue is empty or the drain is paused.
    ///
    /// Returns the number of jobs taken from the queue. Meant for
    /// [`WorkerMode::Manual`]; the host's loop provides the pause between calls.
    pub fn drain_pending(&self) -> usize {
        let mut processed = 0;
        loop {
            match self.shared.drain_step() {
                DrainOutcome::Idle | DrainOutcome::Paused | DrainOutcome::Busy => return processed,
                _ => processed += 1,
            }
        }
    }

    /// Runs one budget monitor tick now, if running.
    pub fn run_budget_check(&self) -> Option<TickReport> {
        self.shared.budget_check()
    }

    /// Stops the workers, cancels a pending reclamation hint, drops every
    /// queued job and releases every payload.
    ///
    /// Publishes [`Notification::Disposed`]. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.shared.transition(ManagerState::Disposed).is_err() {
            return;
        }

        let workers = lock(&self.workers).take();
        if let Some(mut workers) = workers {
            workers.stop();
        }
        self.shared.cleanup.shutdown();
        let dropped = self.shared.streaming.drop_all();
        let released = self.shared.stores.clear_all();

        log::info!("Resource manager disposed: released {released} entries, dropped {dropped} jobs");
        self.shared.bus.publish(Notification::Disposed);
    }

    fn wake_drain(&self) {
        if let Some(workers) = lock(&self.workers).as_ref() {
            workers.wake();
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("state", &self.shared.state())
            .field("worker_mode", &self.shared.config.worker_mode)
            .finish()
    }
}
