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

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// The lifecycle of a single streaming job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Waiting in the queue.
    Queued = 0,
    /// Being fetched by the drain lane.
    Running = 1,
    /// The result was installed in the cache.
    Applied = 2,
    /// The result would have lowered quality and was discarded.
    Rejected = 3,
    /// The fetch failed; the cached entry was left untouched.
    Failed = 4,
    /// A newer job for the same key replaced this one before it ran.
    Superseded = 5,
    /// The job was discarded because its entry or manager went away.
    Dropped = 6,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Queued,
            1 => TaskState::Running,
            2 => TaskState::Applied,
            3 => TaskState::Rejected,
            4 => TaskState::Failed,
            5 => TaskState::Superseded,
            _ => TaskState::Dropped,
        }
    }

    /// Returns `true` once the job can no longer change the cache.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// A shared, observable handle to a streaming job.
///
/// Cloning is cheap; every clone observes the same state. Dropping a handle
/// never affects the job itself.
#[derive(Debug, Clone)]
pub struct StreamTask {
    state: Arc<AtomicU8>,
}

impl StreamTask {
    /// Creates a new handle in the `Queued` state.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(TaskState::Queued as u8)),
        }
    }

    /// Returns the current state of the job.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Moves the job to a new state. Terminal states are final.
    ///
    /// Returns `false` if the job had already finished.
    pub fn transition(&self, next: TaskState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if TaskState::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .is_ok()
    }

    /// Returns `true` if both handles refer to the same job.
    pub fn same_task(&self, other: &StreamTask) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for StreamTask {
    fn default() -> Self {
        Self::new()
    }
}
