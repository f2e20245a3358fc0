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

//! A lane that retargets cached resources from the viewer's distance.

use tessera_core::config::LodBreakpoints;
use tessera_core::{DetailTier, JobPriority, StreamTask, TaskState, Vec3};
use tessera_data::StoreSet;

use crate::queue::JobOrigin;
use crate::streaming::StreamingLane;

/// What a re-evaluation did.
#[derive(Debug, Clone)]
pub enum LodDecision {
    /// The cached tier already matches the distance.
    Unchanged,
    /// A queued or running job already targets that tier.
    AlreadyPending,
    /// A tier-change job was enqueued.
    Enqueued(StreamTask),
    /// The key is not cached, its entry has no anchor, or a position is not
    /// finite.
    NotTracked,
    /// The anchor is beyond the far breakpoint; no job was scheduled.
    OutOfRange,
}

impl LodDecision {
    /// The enqueued job's handle, if a job was enqueued.
    pub fn task(&self) -> Option<&StreamTask> {
        match self {
            LodDecision::Enqueued(task) => Some(task),
            _ => None,
        }
    }
}

/// Maps viewer distance to a tier and schedules tier-change jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LodLane {
    breakpoints: LodBreakpoints,
}

impl LodLane {
    /// Creates a lane with the given distance breakpoints.
    pub fn new(breakpoints: LodBreakpoints) -> Self {
        Self { breakpoints }
    }

    /// `d <= near` is High, `d <= mid` is Medium, anything further is Low.
    pub fn tier_for_distance(&self, distance: f32) -> DetailTier {
        if distance <= self.breakpoints.near {
            DetailTier::High
        } else if distance <= self.breakpoints.mid {
            DetailTier::Medium
        } else {
            DetailTier::Low
        }
    }

    /// Returns `true` when `distance` is past the far breakpoint.
    pub fn is_out_of_range(&self, distance: f32) -> bool {
        distance > self.breakpoints.far
    }

    /// The tier `anchor` deserves when seen from `viewpoint`.
    pub fn tier_for(&self, viewpoint: Vec3, anchor: Vec3) -> DetailTier {
        self.tier_for_distance(viewpoint.distance(anchor))
    }

    /// Re-evaluates the tier of `key` for a viewer at `viewpoint`.
    ///
    /// Calling this twice with the same viewpoint enqueues at most one job.
    /// When the cached tier already matches, a queued job aiming elsewhere is
    /// superseded. Anchors past the far breakpoint are not retargeted.
    pub fn reevaluate(
        &self,
        stores: &StoreSet,
        streaming: &StreamingLane,
        key: &str,
        viewpoint: Vec3,
    ) -> LodDecision {
        let Some(entry) = stores.find(key) else {
            return LodDecision::NotTracked;
        };
        let Some(anchor) = entry.anchor else {
            return LodDecision::NotTracked;
        };
        if !viewpoint.is_finite() || !anchor.is_finite() {
            log::warn!("Skipping level-of-detail for '{key}': non-finite position");
            return LodDecision::NotTracked;
        }

        let distance = viewpoint.distance(anchor);
        if self.is_out_of_range(distance) {
            return LodDecision::OutOfRange;
        }

        let target = self.tier_for_distance(distance);
        if streaming.scheduled_target(key) == Some(target) {
            return LodDecision::AlreadyPending;
        }

        if entry.tier == target && !entry.is_placeholder {
            if streaming.queued_target(key).is_some() {
                log::debug!("'{key}' is already at {target}; superseding the queued job");
                streaming.cancel(key, TaskState::Superseded);
            }
            return LodDecision::Unchanged;
        }

        let outcome = streaming.enqueue(key, entry.kind, target, JobPriority::Normal, JobOrigin::Lod);
        LodDecision::Enqueued(outcome.task().clone())
    }
}
