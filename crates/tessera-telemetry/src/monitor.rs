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

//! The budget monitor: periodic usage snapshots, severity classification and
//! the cleanup they trigger.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tessera_core::config::{ExpiryPolicy, UsageSource};
use tessera_core::{HostRuntime, ManagerConfig, Notification, NotificationBus, Severity};
use tessera_data::{BudgetSnapshot, StoreSet};
use tessera_lanes::{CleanupLane, CleanupReport};

/// Reconciled figures diverging by more than this are logged.
const DRIFT_LOG_RATIO: f64 = 0.25;

/// Counters retained across ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorDiagnostics {
    /// Ticks run.
    pub ticks: u64,
    /// Highest usage observed by any tick.
    pub peak_bytes: u64,
    /// Usage observed by the latest tick.
    pub current_bytes: u64,
    /// Worst ratio observed by the latest tick.
    pub last_usage_ratio: f64,
    /// Severity chosen by the latest tick.
    pub last_severity: Option<Severity>,
    /// Monitor-triggered standard passes.
    pub standard_triggers: u64,
    /// Monitor-triggered aggressive passes.
    pub aggressive_triggers: u64,
    /// Monitor-triggered critical passes.
    pub critical_triggers: u64,
    /// Standard passes run before admitting a placeholder.
    pub admission_cleanups: u64,
    /// Critical passes after which usage stayed above the limit.
    pub exceeded_after_cleanup: u64,
    /// Entries removed by the expiry sweep.
    pub entries_expired: u64,
    /// Bytes freed by every cleanup pass.
    pub bytes_reclaimed: u64,
}

impl MonitorDiagnostics {
    /// Monitor-triggered passes at `severity`.
    pub fn triggers(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Standard => self.standard_triggers,
            Severity::Aggressive => self.aggressive_triggers,
            Severity::Critical => self.critical_triggers,
        }
    }

    /// Monitor-triggered passes of every severity.
    pub fn total_triggers(&self) -> u64 {
        self.standard_triggers + self.aggressive_triggers + self.critical_triggers
    }

    fn record_trigger(&mut self, report: &CleanupReport) {
        match report.severity {
            Severity::Standard => self.standard_triggers += 1,
            Severity::Aggressive => self.aggressive_triggers += 1,
            Severity::Critical => self.critical_triggers += 1,
        }
        self.bytes_reclaimed += report.bytes_freed();
    }
}

/// What one tick observed and did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// The snapshot the decision was made on.
    pub snapshot: BudgetSnapshot,
    /// Severity selected, `None` when usage is normal.
    pub severity: Option<Severity>,
    /// The cleanup pass, when one ran.
    pub cleanup: Option<CleanupReport>,
    /// Entries removed by the expiry sweep.
    pub expired: usize,
    /// `true` if usage stayed above the limit after a critical pass.
    pub exceeded_after_cleanup: bool,
}

/// Periodically measures usage across the stores and triggers cleanup.
pub struct BudgetMonitor {
    cleanup: Arc<CleanupLane>,
    host: Arc<dyn HostRuntime>,
    bus: Arc<NotificationBus>,
    usage_source: UsageSource,
    expiry: ExpiryPolicy,
    interval: Duration,
    diagnostics: Mutex<MonitorDiagnostics>,
}

impl BudgetMonitor {
    /// Creates a monitor configured from `config`.
    pub fn new(
        config: &ManagerConfig,
        cleanup: Arc<CleanupLane>,
        host: Arc<dyn HostRuntime>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            cleanup,
            host,
            bus,
            usage_source: config.usage_source,
            expiry: config.expiry,
            interval: config.monitor_interval(),
            diagnostics: Mutex::new(MonitorDiagnostics::default()),
        }
    }

    /// The period between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self) -> MutexGuard<'_, MonitorDiagnostics> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Measures usage, reconciling the host heap figure per the usage source.
    ///
    /// With [`UsageSource::CacheSum`] the host figure is recorded but never
    /// feeds the ratio. With [`UsageSource::Conservative`] the larger of the
    /// two figures is authoritative.
    pub fn snapshot(&self, stores: &StoreSet) -> BudgetSnapshot {
        let host_bytes = self.host.heap_usage_bytes();
        let mut snapshot = stores.snapshot(host_bytes);

        if let Some(host_bytes) = host_bytes {
            let cache_bytes = snapshot.total_bytes_used;
            let drift = host_bytes.abs_diff(cache_bytes) as f64 / cache_bytes.max(1) as f64;
            if drift > DRIFT_LOG_RATIO {
                log::debug!(
                    "Host reports {host_bytes} bytes against {cache_bytes} cached ({:?})",
                    self.usage_source
                );
            }
            if self.usage_source == UsageSource::Conservative && host_bytes > cache_bytes {
                snapshot.total_bytes_used = host_bytes;
                snapshot.usage_ratio = host_bytes as f64 / snapshot.limit_bytes.max(1) as f64;
            }
        }
        snapshot
    }

    /// Runs one tick now.
    pub fn tick(&self, stores: &StoreSet) -> TickReport {
        self.tick_at(stores, Instant::now())
    }

    /// Runs one tick as if the clock read `now`.
    ///
    /// Expired entries are swept first, then the worst of the overall and
    /// per-kind ratios is classified. A cleanup pass publishes
    /// [`Notification::BudgetDegraded`]; a critical pass that leaves usage
    /// above the limit also publishes
    /// [`Notification::BudgetExceededAfterCleanup`]. Requests keep being
    /// admitted either way.
    pub fn tick_at(&self, stores: &StoreSet, now: Instant) -> TickReport {
        let expired = stores.expire_stale(now, &self.expiry);
        if expired > 0 {
            log::debug!("Expired {expired} stale entries");
        }

        let snapshot = self.snapshot(stores);
        let usage_ratio = snapshot.worst_ratio();
        let severity = self.cleanup.classify(usage_ratio);

        let cleanup =
            severity.map(|severity| self.cleanup.run(stores, severity, usage_ratio));
        let mut exceeded_after_cleanup = false;
        if let Some(report) = &cleanup {
            self.bus.publish(Notification::BudgetDegraded {
                severity: report.severity,
                usage_ratio,
            });
            if report.severity == Severity::Critical {
                let after = self.snapshot(stores).worst_ratio();
                if after > 1.0 {
                    log::warn!(
                        "Usage still at {:.1}% of the limit after critical cleanup",
                        after * 100.0
                    );
                    self.bus
                        .publish(Notification::BudgetExceededAfterCleanup { usage_ratio: after });
                    exceeded_after_cleanup = true;
                }
            }
        }

        {
            let mut diagnostics = self.lock();
            diagnostics.ticks += 1;
            diagnostics.current_bytes = snapshot.total_bytes_used;
            diagnostics.peak_bytes = diagnostics.peak_bytes.max(snapshot.total_bytes_used);
            diagnostics.last_usage_ratio = usage_ratio;
            diagnostics.last_severity = severity;
            diagnostics.entries_expired += expired as u64;
            if let Some(report) = &cleanup {
                diagnostics.record_trigger(report);
            }
            if exceeded_after_cleanup {
                diagnostics.exceeded_after_cleanup += 1;
            }
        }

        TickReport {
            snapshot,
            severity,
            cleanup,
            expired,
            exceeded_after_cleanup,
        }
    }

    /// Records a pass run outside a tick, before admitting a placeholder.
    pub fn record_admission_cleanup(&self, report: &CleanupReport) {
        let mut diagnostics = self.lock();
        diagnostics.admission_cleanups += 1;
        diagnostics.bytes_reclaimed += report.bytes_freed();
    }

    /// Keeps the peak current when usage is observed outside a tick.
    pub fn observe(&self, snapshot: &BudgetSnapshot) {
        let mut diagnostics = self.lock();
        diagnostics.peak_bytes = diagnostics.peak_bytes.max(snapshot.total_bytes_used);
    }

    /// A copy of the counters.
    pub fn diagnostics(&self) -> MonitorDiagnostics {
        self.lock().clone()
    }
}

impl std::fmt::Debug for BudgetMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetMonitor")
            .field("usage_source", &self.usage_source)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::{
        DetailTier, ResourceKind, ResourcePayload, ResourceShape, StrategyClass,
    };
    use tessera_data::CacheEntry;

    #[derive(Default)]
    struct CountingHost {
        hints: AtomicUsize,
        heap: Option<u64>,
    }

    impl HostRuntime for CountingHost {
        fn heap_usage_bytes(&self) -> Option<u64> {
            self.heap
        }

        fn request_reclamation(&self) {
            self.hints.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Blob(u64);

    impl ResourcePayload for Blob {
        fn shape(&self) -> ResourceShape {
            ResourceShape::Buffer { byte_len: self.0 }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Every limit is 1000 bytes, so the buffer ratio equals the overall ratio.
    fn config(usage_source: UsageSource) -> ManagerConfig {
        ManagerConfig {
            total_limit_bytes: 1000,
            image_limit_bytes: 1000,
            mesh_limit_bytes: 1000,
            buffer_limit_bytes: 1000,
            reclaim_retry_delay_ms: 0,
            usage_source,
            ..ManagerConfig::default()
        }
    }

    fn monitor(config: &ManagerConfig, host: Arc<CountingHost>) -> (BudgetMonitor, Arc<NotificationBus>) {
        let bus = Arc::new(NotificationBus::new());
        let cleanup = Arc::new(CleanupLane::new(
            config.thresholds,
            config.fractions,
            config.reclaim_retry_delay(),
            host.clone(),
            Arc::clone(&bus),
        ));
        (
            BudgetMonitor::new(config, cleanup, host, Arc::clone(&bus)),
            bus,
        )
    }

    fn fill(stores: &StoreSet, count: usize, bytes: u64, strategy: StrategyClass) {
        for i in 0..count {
            stores.store(ResourceKind::Buffer).put(CacheEntry::new(
                format!("buffers/{strategy:?}/{i}"),
                ResourceKind::Buffer,
                Box::new(Blob(bytes)),
                DetailTier::High,
                strategy,
            ));
        }
    }

    /// Runs one tick over ten entries of `bytes` each.
    fn tick_with(bytes: u64) -> (TickReport, usize) {
        let config = config(UsageSource::CacheSum);
        let host = Arc::new(CountingHost::default());
        let (monitor, _bus) = monitor(&config, Arc::clone(&host));
        let stores = StoreSet::new(&config);
        fill(&stores, 10, bytes, StrategyClass::Important);

        let report = monitor.tick(&stores);
        (report, host.hints.load(Ordering::SeqCst))
    }

    #[test]
    fn test_threshold_mapping() {
        let (report, hints) = tick_with(79);
        assert_relative_eq!(report.snapshot.usage_ratio, 0.79);
        assert_eq!(report.severity, None);
        assert!(report.cleanup.is_none());
        assert_eq!(hints, 0);

        let (report, hints) = tick_with(80);
        assert_eq!(report.severity, Some(Severity::Standard));
        assert_eq!(report.cleanup.unwrap().total_removed(), 2);
        assert_eq!(hints, 0);

        let (report, hints) = tick_with(91);
        assert_eq!(report.severity, Some(Severity::Aggressive));
        assert_eq!(report.cleanup.unwrap().total_removed(), 4);
        assert_eq!(hints, 0);

        let (report, hints) = tick_with(96);
        assert_eq!(report.severity, Some(Severity::Critical));
        let cleanup = report.cleanup.unwrap();
        assert_eq!(cleanup.total_removed(), 6);
        assert_eq!(cleanup.hints_issued, 2);
        assert_eq!(hints, 2);
        assert!(!report.exceeded_after_cleanup);
    }

    #[test]
    fn test_per_kind_ratio_can_drive_severity() {
        let config = ManagerConfig {
            buffer_limit_bytes: 100,
            ..config(UsageSource::CacheSum)
        };
        let (monitor, bus) = monitor(&config, Arc::new(CountingHost::default()));
        let events = bus.subscribe();
        let stores = StoreSet::new(&config);
        fill(&stores, 5, 17, StrategyClass::Important);

        // 85 of 1000 overall, but 85 of 100 for buffers.
        let report = monitor.tick(&stores);
        assert_relative_eq!(report.snapshot.usage_ratio, 0.085);
        assert_eq!(report.severity, Some(Severity::Standard));
        assert_eq!(
            events.try_recv().ok(),
            Some(Notification::BudgetDegraded {
                severity: Severity::Standard,
                usage_ratio: 0.85
            })
        );
    }

    #[test]
    fn test_diagnostics_accumulate() {
        let config = config(UsageSource::CacheSum);
        let (monitor, _bus) = monitor(&config, Arc::new(CountingHost::default()));
        let stores = StoreSet::new(&config);
        fill(&stores, 10, 96, StrategyClass::Important);

        monitor.tick(&stores);
        monitor.tick(&stores);
        monitor.tick(&stores);

        let diagnostics = monitor.diagnostics();
        assert_eq!(diagnostics.ticks, 3);
        assert_eq!(diagnostics.peak_bytes, 960);
        assert_eq!(diagnostics.triggers(Severity::Critical), 1);
        // 384 bytes left after the critical pass: below every threshold.
        assert_eq!(diagnostics.current_bytes, 384);
        assert_eq!(diagnostics.last_severity, None);
        assert_eq!(diagnostics.total_triggers(), 1);
        assert_eq!(diagnostics.bytes_reclaimed, 576);
    }

    #[test]
    fn test_conservative_source_reports_exceeded_after_cleanup() {
        let config = config(UsageSource::Conservative);
        let host = Arc::new(CountingHost {
            heap: Some(5000),
            ..CountingHost::default()
        });
        let (monitor, bus) = monitor(&config, Arc::clone(&host));
        let events = bus.subscribe();
        let stores = StoreSet::new(&config);
        fill(&stores, 2, 100, StrategyClass::Important);

        let report = monitor.tick(&stores);

        assert_eq!(report.snapshot.total_bytes_used, 5000);
        assert_eq!(report.snapshot.host_heap_bytes, Some(5000));
        assert_eq!(report.severity, Some(Severity::Critical));
        assert!(report.exceeded_after_cleanup);
        assert_eq!(monitor.diagnostics().exceeded_after_cleanup, 1);

        let received: Vec<Notification> = events.try_iter().collect();
        assert!(received.contains(&Notification::BudgetExceededAfterCleanup { usage_ratio: 5.0 }));
        assert!(received
            .iter()
            .any(|n| matches!(n, Notification::Critical { .. })));
    }

    #[test]
    fn test_cache_sum_ignores_host_figure() {
        let config = config(UsageSource::CacheSum);
        let host = Arc::new(CountingHost {
            heap: Some(5000),
            ..CountingHost::default()
        });
        let (monitor, _bus) = monitor(&config, host);
        let stores = StoreSet::new(&config);
        fill(&stores, 2, 100, StrategyClass::Important);

        let snapshot = monitor.snapshot(&stores);
        assert_eq!(snapshot.total_bytes_used, 200);
        assert_relative_eq!(snapshot.usage_ratio, 0.2);
        assert_eq!(snapshot.host_heap_bytes, Some(5000));
    }

    #[test]
    fn test_tick_sweeps_expired_entries() {
        let config = config(UsageSource::CacheSum);
        let (monitor, _bus) = monitor(&config, Arc::new(CountingHost::default()));
        let stores = StoreSet::new(&config);
        fill(&stores, 3, 10, StrategyClass::Optional);
        fill(&stores, 2, 10, StrategyClass::Essential);

        let report = monitor.tick_at(&stores, Instant::now() + Duration::from_secs(3600));

        assert_eq!(report.expired, 3);
        assert_eq!(report.snapshot.total_bytes_used, 20);
        assert_eq!(monitor.diagnostics().entries_expired, 3);
    }
}
