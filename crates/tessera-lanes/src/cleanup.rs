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

//! The cleanup lane: severity-scaled LRU eviction across every store.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use tessera_core::config::{CleanupFractions, CleanupThresholds};
use tessera_core::{HostRuntime, Notification, NotificationBus, ResourceKind, Severity};
use tessera_data::{BudgetSnapshot, StoreSet};

/// What a cleanup pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupReport {
    /// The severity of the pass.
    pub severity: Severity,
    /// The fraction of each store's entries targeted.
    pub fraction: f64,
    /// Entries removed per kind, in [`ResourceKind::ALL`] order.
    pub removed: Vec<(ResourceKind, usize)>,
    /// Cache usage before the pass.
    pub bytes_before: u64,
    /// Cache usage after the pass.
    pub bytes_after: u64,
    /// Host reclamation hints issued or scheduled.
    pub hints_issued: u32,
}

impl CleanupReport {
    /// Total entries removed across every store.
    pub fn total_removed(&self) -> usize {
        self.removed.iter().map(|(_, count)| count).sum()
    }

    /// Entries removed from one store.
    pub fn removed_from(&self, kind: ResourceKind) -> usize {
        self.removed
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, count)| *count)
    }

    /// Bytes reclaimed by the pass.
    pub fn bytes_freed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// The thread that issues the delayed reclamation hint.
struct DelayedHint {
    /// Dropping it disconnects the channel and skips the hint.
    cancel_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Evicts the least recently used entries of each store by severity.
///
/// At critical severity the lane also hints the host to reclaim memory twice,
/// once immediately and once after `reclaim_retry_delay`, and publishes
/// [`Notification::Critical`]. At most one delayed hint is pending at a time.
/// Entries are never pinned.
pub struct CleanupLane {
    thresholds: CleanupThresholds,
    fractions: CleanupFractions,
    reclaim_retry_delay: Duration,
    host: Arc<dyn HostRuntime>,
    bus: Arc<NotificationBus>,
    delayed_hint: Mutex<Option<DelayedHint>>,
}

impl CleanupLane {
    /// Creates a new `CleanupLane`.
    pub fn new(
        thresholds: CleanupThresholds,
        fractions: CleanupFractions,
        reclaim_retry_delay: Duration,
        host: Arc<dyn HostRuntime>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            thresholds,
            fractions,
            reclaim_retry_delay,
            host,
            bus,
            delayed_hint: Mutex::new(None),
        }
    }

    /// The severity a usage ratio calls for, if any.
    pub fn classify(&self, usage_ratio: f64) -> Option<Severity> {
        self.thresholds.classify(usage_ratio)
    }

    /// Whether a new placeholder must be preceded by a standard pass.
    pub fn needs_admission_cleanup(&self, snapshot: &BudgetSnapshot) -> bool {
        snapshot.worst_ratio() >= self.thresholds.standard
    }

    /// Runs one pass at `severity`. `usage_ratio` is the reading that triggered it.
    pub fn run(&self, stores: &StoreSet, severity: Severity, usage_ratio: f64) -> CleanupReport {
        let fraction = self.fractions.for_severity(severity);
        let bytes_before = stores.total_bytes();

        let removed: Vec<(ResourceKind, usize)> = stores
            .iter()
            .map(|store| (store.kind(), store.remove_lru(fraction)))
            .collect();

        let hints_issued = if severity == Severity::Critical {
            self.bus.publish(Notification::Critical { usage_ratio });
            self.request_reclamation_twice()
        } else {
            0
        };

        let report = CleanupReport {
            severity,
            fraction,
            removed,
            bytes_before,
            bytes_after: stores.total_bytes(),
            hints_issued,
        };
        log::info!(
            "{} cleanup at {:.1}% usage: removed {} entries, freed {} bytes",
            severity,
            usage_ratio * 100.0,
            report.total_removed(),
            report.bytes_freed()
        );
        report
    }

    fn request_reclamation_twice(&self) -> u32 {
        self.host.request_reclamation();

        if self.reclaim_retry_delay.is_zero() {
            self.host.request_reclamation();
            return 2;
        }

        let mut pending = self
            .delayed_hint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hint) = pending.as_ref() {
            if !hint.handle.is_finished() {
                log::debug!("Delayed reclamation hint already pending");
                return 2;
            }
        }
        if let Some(finished) = pending.take() {
            let _ = finished.handle.join();
        }

        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let host = Arc::clone(&self.host);
        let delay = self.reclaim_retry_delay;
        let spawned = thread::Builder::new()
            .name("tessera-reclaim".to_owned())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(delay) {
                    host.request_reclamation();
                }
            });
        match spawned {
            Ok(handle) => {
                *pending = Some(DelayedHint { cancel_tx, handle });
                2
            }
            Err(error) => {
                log::warn!("Could not schedule the delayed reclamation hint: {error}");
                1
            }
        }
    }

    /// Returns `true` while a delayed reclamation hint is waiting to fire.
    pub fn has_pending_hint(&self) -> bool {
        self.delayed_hint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|hint| !hint.handle.is_finished())
    }

    /// Cancels a pending delayed hint and waits for its thread to exit.
    pub fn shutdown(&self) {
        let pending = self
            .delayed_hint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(DelayedHint { cancel_tx, handle }) = pending {
            drop(cancel_tx);
            if handle.join().is_err() {
                log::error!("The reclamation hint thread panicked.");
            }
        }
    }
}

impl Drop for CleanupLane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CleanupLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupLane")
            .field("thresholds", &self.thresholds)
            .field("fractions", &self.fractions)
            .field("reclaim_retry_delay", &self.reclaim_retry_delay)
            .finish()
    }
}
