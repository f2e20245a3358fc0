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

//! The streaming lane: placeholder admission and the single-job drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tessera_core::config::ExpiryPolicy;
use tessera_core::resource::PlaceholderPayload;
use tessera_core::{
    DetailTier, FetchRequest, JobPriority, Notification, NotificationBus, ResourceKind,
    ResourceSource, StrategyClass, StreamTask, TaskState, Vec3,
};
use tessera_data::{ApplyOutcome, CacheEntry, EntrySnapshot, StoreSet};

use crate::queue::{EnqueueOutcome, JobOrigin, JobQueue, StreamJob};

/// Caller options for a resource request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOptions {
    /// Priority of the upgrade job.
    pub priority: JobPriority,
    /// The highest tier the caller wants.
    pub max_tier: DetailTier,
    /// Overrides the strategy class derived from the key.
    pub strategy: Option<StrategyClass>,
    /// World-space position of the resource, for level-of-detail decisions.
    pub anchor: Option<Vec3>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            priority: JobPriority::Normal,
            max_tier: DetailTier::High,
            strategy: None,
            anchor: None,
        }
    }
}

impl RequestOptions {
    /// Sets the job priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the highest wanted tier.
    pub fn with_max_tier(mut self, max_tier: DetailTier) -> Self {
        self.max_tier = max_tier;
        self
    }

    /// Sets the strategy class explicitly.
    pub fn with_strategy(mut self, strategy: StrategyClass) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the world-space anchor.
    pub fn with_anchor(mut self, anchor: Vec3) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// What a caller gets back from a request: the entry's metadata at the time of
/// the call, and the upgrade job's handle, if one is scheduled.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    /// The resource key.
    pub key: String,
    /// The kind of resource.
    pub kind: ResourceKind,
    /// The tier cached when the handle was issued.
    pub tier: DetailTier,
    /// Estimated footprint when the handle was issued.
    pub size_bytes: u64,
    /// `true` if the placeholder was returned.
    pub is_placeholder: bool,
    /// The scheduled upgrade job, if any.
    pub task: Option<StreamTask>,
}

impl ResourceHandle {
    fn from_snapshot(snapshot: EntrySnapshot, task: Option<StreamTask>) -> Self {
        Self {
            key: snapshot.key,
            kind: snapshot.kind,
            tier: snapshot.tier,
            size_bytes: snapshot.size_bytes,
            is_placeholder: snapshot.is_placeholder,
            task,
        }
    }

    /// The tier expressed as a mesh level of detail (`0` is the finest).
    pub fn lod(&self) -> u8 {
        self.tier.lod()
    }
}

/// Result of one drain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue was empty.
    Idle,
    /// The drain is paused; nothing was taken from the queue.
    Paused,
    /// Another drain is running a job; nothing was taken from the queue.
    Busy,
    /// A job installed its payload.
    Applied {
        /// The resource key.
        key: String,
        /// The tier now cached.
        tier: DetailTier,
    },
    /// A job's result would have lowered the tier, or overshot the job's
    /// target, and was discarded.
    Rejected {
        /// The resource key.
        key: String,
        /// The tier kept.
        current: DetailTier,
    },
    /// The fetch failed; the cached tier was kept.
    Failed {
        /// The resource key.
        key: String,
    },
    /// The entry was gone by the time the job ran.
    Dropped {
        /// The resource key.
        key: String,
    },
}

struct InFlight {
    key: String,
    target: DetailTier,
    task: StreamTask,
}

#[derive(Default)]
struct LaneState {
    queue: JobQueue,
    in_flight: Option<InFlight>,
}

/// Admits placeholders into the stores and runs upgrade jobs one at a time.
pub struct StreamingLane {
    state: Mutex<LaneState>,
    paused: AtomicBool,
    expiry: ExpiryPolicy,
}

impl StreamingLane {
    /// Creates an idle lane that treats entries past `expiry` as misses.
    pub fn new(expiry: ExpiryPolicy) -> Self {
        Self {
            state: Mutex::new(LaneState::default()),
            paused: AtomicBool::new(false),
            expiry,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the live entry for `key`, refreshing its recency.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn lookup(&self, stores: &StoreSet, key: &str, kind: ResourceKind) -> Option<ResourceHandle> {
        let snapshot = stores.store(kind).get_unexpired(key, &self.expiry)?;
        Some(ResourceHandle::from_snapshot(snapshot, self.task_for(key)))
    }

    /// Inserts a placeholder for `key` and schedules its upgrade to `target`.
    ///
    /// Never blocks on the fetch. The handle describes the placeholder.
    pub fn admit(
        &self,
        stores: &StoreSet,
        key: &str,
        kind: ResourceKind,
        options: &RequestOptions,
        target: DetailTier,
    ) -> ResourceHandle {
        let strategy = options
            .strategy
            .unwrap_or_else(|| StrategyClass::from_key(key));
        let entry = CacheEntry::new(
            key,
            kind,
            Box::new(PlaceholderPayload::new(kind)),
            DetailTier::Low,
            strategy,
        )
        .with_anchor(options.anchor);
        let snapshot = entry.snapshot();
        stores.store(kind).put(entry);

        let outcome = self.enqueue(key, kind, target, options.priority, JobOrigin::Request);
        ResourceHandle::from_snapshot(snapshot, Some(outcome.task().clone()))
    }

    /// Queues a job, coalescing with any job already queued for `key`.
    pub fn enqueue(
        &self,
        key: &str,
        kind: ResourceKind,
        target: DetailTier,
        priority: JobPriority,
        origin: JobOrigin,
    ) -> EnqueueOutcome {
        let outcome = self.lock().queue.push(key, kind, target, priority, origin);
        match &outcome {
            EnqueueOutcome::Queued(_) => {
                log::debug!("Queued {origin:?} job for '{key}' targeting {target}");
            }
            EnqueueOutcome::Coalesced { .. } => {
                log::debug!("Coalesced {origin:?} job for '{key}', now targeting {target}");
            }
        }
        outcome
    }

    /// Runs the next job, if the lane is not paused.
    ///
    /// Only one job runs at a time: while another caller's job is in flight
    /// this returns [`DrainOutcome::Busy`]. The fetch happens without holding
    /// any lock. A job whose entry is gone is dropped without fetching. A
    /// result above the job's target is discarded. A failed fetch is logged
    /// and published and leaves the entry untouched; it is not retried.
    pub fn drain_one(
        &self,
        stores: &StoreSet,
        source: &dyn ResourceSource,
        bus: &NotificationBus,
    ) -> DrainOutcome {
        if self.is_paused() {
            return DrainOutcome::Paused;
        }

        let job = {
            let mut state = self.lock();
            if state.in_flight.is_some() {
                return DrainOutcome::Busy;
            }
            let Some(job) = state.queue.pop() else {
                return DrainOutcome::Idle;
            };
            state.in_flight = Some(InFlight {
                key: job.key.clone(),
                target: job.target,
                task: job.task.clone(),
            });
            job
        };

        let outcome = Self::run_job(stores, source, bus, job);
        self.lock().in_flight = None;
        outcome
    }

    fn run_job(
        stores: &StoreSet,
        source: &dyn ResourceSource,
        bus: &NotificationBus,
        job: StreamJob,
    ) -> DrainOutcome {
        let StreamJob {
            key,
            kind,
            target,
            origin,
            task,
            ..
        } = job;
        task.transition(TaskState::Running);

        let store = stores.store(kind);
        if !store.contains(&key) {
            log::debug!("Dropping job for '{key}': entry no longer cached");
            task.transition(TaskState::Dropped);
            return DrainOutcome::Dropped { key };
        }

        let request = FetchRequest {
            key: &key,
            kind,
            target,
        };
        let fetched = match source.fetch(&request) {
            Ok(fetched) => fetched,
            Err(error) => {
                log::warn!("Streaming '{key}' to {target} failed: {error}");
                task.transition(TaskState::Failed);
                bus.publish(Notification::ResourceFailed {
                    key: key.clone(),
                    reason: error.to_string(),
                });
                return DrainOutcome::Failed { key };
            }
        };

        let tier = fetched.tier;
        if tier > target {
            fetched.payload.release();
            task.transition(TaskState::Rejected);
            let Some(current) = store.peek(&key).map(|entry| entry.tier) else {
                return DrainOutcome::Dropped { key };
            };
            log::warn!("Discarded {tier} result for '{key}': the job asked for {target}");
            return DrainOutcome::Rejected { key, current };
        }

        match store.apply(&key, fetched.payload, tier, origin.allows_downgrade()) {
            ApplyOutcome::Applied { previous } => {
                log::debug!("Upgraded '{key}' from {previous} to {tier}");
                task.transition(TaskState::Applied);
                bus.publish(Notification::ResourceUpgraded {
                    key: key.clone(),
                    kind,
                    tier,
                });
                DrainOutcome::Applied { key, tier }
            }
            ApplyOutcome::Rejected { current } => {
                log::warn!("Discarded {tier} result for '{key}': {current} is already cached");
                task.transition(TaskState::Rejected);
                DrainOutcome::Rejected { key, current }
            }
            ApplyOutcome::Missing => {
                log::debug!("Dropping result for '{key}': evicted during fetch");
                task.transition(TaskState::Dropped);
                DrainOutcome::Dropped { key }
            }
        }
    }

    /// The tier that will be cached for `key` once scheduled work completes.
    ///
    /// A queued job takes precedence over the in-flight one because it will
    /// apply last.
    pub fn scheduled_target(&self, key: &str) -> Option<DetailTier> {
        let state = self.lock();
        state.queue.get(key).map(|job| job.target).or_else(|| {
            state
                .in_flight
                .as_ref()
                .filter(|job| job.key == key)
                .map(|job| job.target)
        })
    }

    /// The queued target for `key`, ignoring any in-flight job.
    pub fn queued_target(&self, key: &str) -> Option<DetailTier> {
        self.lock().queue.get(key).map(|job| job.target)
    }

    /// The handle of the latest job scheduled for `key`.
    pub fn task_for(&self, key: &str) -> Option<StreamTask> {
        let state = self.lock();
        state.queue.get(key).map(|job| job.task.clone()).or_else(|| {
            state
                .in_flight
                .as_ref()
                .filter(|job| job.key == key)
                .map(|job| job.task.clone())
        })
    }

    /// Removes the queued job for `key` and resolves it to `state`.
    ///
    /// An in-flight job is never cancelled.
    pub fn cancel(&self, key: &str, state: TaskState) -> bool {
        match self.lock().queue.remove(key) {
            Some(job) => {
                job.task.transition(state);
                true
            }
            None => false,
        }
    }

    /// Removes every queued job, resolving each to [`TaskState::Dropped`].
    pub fn drop_all(&self) -> usize {
        let jobs = self.lock().queue.drain_all();
        for job in &jobs {
            job.task.transition(TaskState::Dropped);
        }
        jobs.len()
    }

    /// Number of queued jobs, not counting the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns `true` if nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.queue.is_empty() && state.in_flight.is_none()
    }

    /// Stops the drain from taking new jobs. A job already running completes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Lets the drain take jobs again.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for StreamingLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingLane")
            .field("pending", &self.pending_len())
            .field("paused", &self.is_paused())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::collections::HashSet;
    use tessera_core::{FetchError, FetchedResource, ManagerConfig, ResourcePayload, ResourceShape};

    struct Mesh(u32);

    impl ResourcePayload for Mesh {
        fn shape(&self) -> ResourceShape {
            ResourceShape::Mesh {
                vertex_count: self.0,
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Produces meshes whose vertex count grows with the requested tier.
    #[derive(Default)]
    struct TieredSource {
        failing: HashSet<String>,
        produce: Option<DetailTier>,
    }

    impl ResourceSource for TieredSource {
        fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource, FetchError> {
            if self.failing.contains(request.key) {
                return Err(FetchError::NotFound {
                    key: request.key.to_owned(),
                });
            }
            let tier = self.produce.unwrap_or(request.target);
            let vertices = match tier {
                DetailTier::Low => 100,
                DetailTier::Medium => 1_000,
                DetailTier::High => 10_000,
            };
            Ok(FetchedResource::new(Mesh(vertices), tier))
        }
    }

    fn setup() -> (StoreSet, StreamingLane, NotificationBus) {
        (
            StoreSet::new(&ManagerConfig::default()),
            StreamingLane::new(ExpiryPolicy::default()),
            NotificationBus::new(),
        )
    }

    #[test]
    fn test_admit_returns_placeholder_and_queues_upgrade() {
        let (stores, lane, _bus) = setup();

        let handle = lane.admit(
            &stores,
            "rock.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::High,
        );

        assert!(handle.is_placeholder);
        assert_eq!(handle.lod(), 2);
        assert_eq!(handle.task.as_ref().map(StreamTask::state), Some(TaskState::Queued));
        assert_eq!(lane.scheduled_target("rock.mesh"), Some(DetailTier::High));
        assert!(stores.store(ResourceKind::Mesh).contains("rock.mesh"));
    }

    #[test]
    fn test_drain_applies_and_publishes() {
        let (stores, lane, bus) = setup();
        let events = bus.subscribe();
        let handle = lane.admit(
            &stores,
            "rock.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::Medium,
        );

        let outcome = lane.drain_one(&stores, &TieredSource::default(), &bus);
        assert_eq!(
            outcome,
            DrainOutcome::Applied {
                key: "rock.mesh".into(),
                tier: DetailTier::Medium
            }
        );
        assert_eq!(handle.task.unwrap().state(), TaskState::Applied);
        let entry = stores.find("rock.mesh").unwrap();
        assert_eq!(entry.tier, DetailTier::Medium);
        assert_eq!(entry.size_bytes, 1_000 * 8 * 4);
        assert_eq!(
            events.try_recv().ok(),
            Some(Notification::ResourceUpgraded {
                key: "rock.mesh".into(),
                kind: ResourceKind::Mesh,
                tier: DetailTier::Medium
            })
        );
        assert!(lane.is_idle());
        assert_eq!(lane.drain_one(&stores, &TieredSource::default(), &bus), DrainOutcome::Idle);
    }

    #[test]
    fn test_failed_fetch_keeps_placeholder() {
        let (stores, lane, bus) = setup();
        let events = bus.subscribe();
        let source = TieredSource {
            failing: HashSet::from(["missing.mesh".to_owned()]),
            ..TieredSource::default()
        };
        let handle = lane.admit(
            &stores,
            "missing.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::High,
        );

        assert_eq!(
            lane.drain_one(&stores, &source, &bus),
            DrainOutcome::Failed {
                key: "missing.mesh".into()
            }
        );
        assert_eq!(handle.task.unwrap().state(), TaskState::Failed);
        assert!(stores.find("missing.mesh").unwrap().is_placeholder);
        assert!(matches!(
            events.try_recv(),
            Ok(Notification::ResourceFailed { key, .. }) if key == "missing.mesh"
        ));
        // No retry.
        assert_eq!(lane.drain_one(&stores, &source, &bus), DrainOutcome::Idle);
    }

    #[test]
    fn test_job_for_evicted_entry_is_dropped() {
        let (stores, lane, bus) = setup();
        let handle = lane.admit(
            &stores,
            "rock.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::High,
        );
        stores.store(ResourceKind::Mesh).invalidate("rock.mesh");

        assert_eq!(
            lane.drain_one(&stores, &TieredSource::default(), &bus),
            DrainOutcome::Dropped {
                key: "rock.mesh".into()
            }
        );
        assert_eq!(handle.task.unwrap().state(), TaskState::Dropped);
        assert!(stores.find("rock.mesh").is_none());
    }

    #[test]
    fn test_request_job_never_lowers_quality() {
        let (stores, lane, bus) = setup();
        lane.admit(
            &stores,
            "rock.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::High,
        );
        lane.drain_one(&stores, &TieredSource::default(), &bus);

        let low_source = TieredSource {
            produce: Some(DetailTier::Low),
            ..TieredSource::default()
        };
        lane.enqueue(
            "rock.mesh",
            ResourceKind::Mesh,
            DetailTier::High,
            JobPriority::Normal,
            JobOrigin::Request,
        );
        assert_eq!(
            lane.drain_one(&stores, &low_source, &bus),
            DrainOutcome::Rejected {
                key: "rock.mesh".into(),
                current: DetailTier::High
            }
        );
        assert_eq!(stores.find("rock.mesh").unwrap().tier, DetailTier::High);

        // A level-of-detail job may lower it.
        lane.enqueue(
            "rock.mesh",
            ResourceKind::Mesh,
            DetailTier::Low,
            JobPriority::Normal,
            JobOrigin::Lod,
        );
        lane.drain_one(&stores, &TieredSource::default(), &bus);
        assert_eq!(stores.find("rock.mesh").unwrap().tier, DetailTier::Low);
    }

    #[test]
    fn test_result_above_target_is_discarded() {
        let (stores, lane, bus) = setup();
        let handle = lane.admit(
            &stores,
            "rock.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::Medium,
        );
        let eager_source = TieredSource {
            produce: Some(DetailTier::High),
            ..TieredSource::default()
        };

        assert_eq!(
            lane.drain_one(&stores, &eager_source, &bus),
            DrainOutcome::Rejected {
                key: "rock.mesh".into(),
                current: DetailTier::Low
            }
        );
        assert_eq!(handle.task.unwrap().state(), TaskState::Rejected);
        let entry = stores.find("rock.mesh").unwrap();
        assert!(entry.is_placeholder);
        assert_eq!(entry.tier, DetailTier::Low);
    }

    #[test]
    fn test_pause_holds_jobs() {
        let (stores, lane, bus) = setup();
        lane.admit(
            &stores,
            "rock.mesh",
            ResourceKind::Mesh,
            &RequestOptions::default(),
            DetailTier::High,
        );

        lane.pause();
        assert_eq!(lane.drain_one(&stores, &TieredSource::default(), &bus), DrainOutcome::Paused);
        assert_eq!(lane.pending_len(), 1);

        lane.resume();
        assert!(matches!(
            lane.drain_one(&stores, &TieredSource::default(), &bus),
            DrainOutcome::Applied { .. }
        ));
    }

    #[test]
    fn test_drop_all_resolves_queued_tasks() {
        let (stores, lane, _bus) = setup();
        let a = lane.admit(&stores, "a.mesh", ResourceKind::Mesh, &RequestOptions::default(), DetailTier::High);
        let b = lane.admit(&stores, "b.mesh", ResourceKind::Mesh, &RequestOptions::default(), DetailTier::High);

        assert_eq!(lane.drop_all(), 2);
        assert_eq!(a.task.unwrap().state(), TaskState::Dropped);
        assert_eq!(b.task.unwrap().state(), TaskState::Dropped);
        assert!(lane.is_idle());
    }

    #[test]
    fn test_strategy_hint_overrides_key_heuristic() {
        let (stores, lane, _bus) = setup();
        lane.admit(&stores, "ui/frame.png", ResourceKind::Image, &RequestOptions::default(), DetailTier::High);
        lane.admit(
            &stores,
            "rock_preview.png",
            ResourceKind::Image,
            &RequestOptions::default().with_strategy(StrategyClass::Essential),
            DetailTier::High,
        );

        assert_eq!(stores.find("ui/frame.png").unwrap().strategy, StrategyClass::Essential);
        assert_eq!(
            stores.find("rock_preview.png").unwrap().strategy,
            StrategyClass::Essential
        );
    }
}
