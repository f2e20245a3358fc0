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

//! A priority queue of streaming jobs that keeps at most one job per key.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tessera_core::{DetailTier, JobPriority, ResourceKind, StreamTask, TaskState};

/// Why a job was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOrigin {
    /// The initial upgrade after a cache miss. Its result may not lower the tier.
    Request,
    /// A level-of-detail change. Its result may lower the tier.
    Lod,
}

impl JobOrigin {
    /// Whether a result produced by this job may replace a higher tier.
    pub fn allows_downgrade(&self) -> bool {
        matches!(self, JobOrigin::Lod)
    }
}

/// A unit of background streaming work.
#[derive(Debug, Clone)]
pub struct StreamJob {
    /// The resource key.
    pub key: String,
    /// The kind of resource.
    pub kind: ResourceKind,
    /// The tier the job aims for.
    pub target: DetailTier,
    /// Scheduling priority.
    pub priority: JobPriority,
    /// What enqueued the job.
    pub origin: JobOrigin,
    /// The handle observers hold.
    pub task: StreamTask,
}

/// Result of [`JobQueue::push`].
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// No job was queued for the key; the new job joined the back of its priority.
    Queued(StreamTask),
    /// A job was already queued for the key. The new job took its place in the
    /// queue and the old one resolved to [`TaskState::Superseded`].
    Coalesced {
        /// The new job's handle.
        task: StreamTask,
        /// The replaced job's handle.
        superseded: StreamTask,
    },
}

impl EnqueueOutcome {
    /// The handle of the job now queued.
    pub fn task(&self) -> &StreamTask {
        match self {
            EnqueueOutcome::Queued(task) => task,
            EnqueueOutcome::Coalesced { task, .. } => task,
        }
    }
}

struct Slot {
    job: StreamJob,
    seq: u64,
    generation: u64,
}

/// Heap ordering entry. Entries whose generation no longer matches the slot are stale.
#[derive(Debug, PartialEq, Eq)]
struct Ticket {
    priority: JobPriority,
    seq: u64,
    generation: u64,
    key: String,
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then the earlier enqueue.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Jobs ordered by priority (High before Normal before Low), FIFO within a priority.
///
/// Pushing a job for a key that already has one queued coalesces the two: the
/// queued job is superseded, the new one keeps the earlier queue position and
/// takes the higher priority. This preserves per-key enqueue order.
#[derive(Default)]
pub struct JobQueue {
    slots: HashMap<String, Slot>,
    heap: BinaryHeap<Ticket>,
    next_seq: u64,
    next_generation: u64,
}

impl JobQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a job, coalescing with any job already queued for the same key.
    pub fn push(
        &mut self,
        key: &str,
        kind: ResourceKind,
        target: DetailTier,
        priority: JobPriority,
        origin: JobOrigin,
    ) -> EnqueueOutcome {
        self.next_generation += 1;
        let generation = self.next_generation;
        let task = StreamTask::new();

        let (seq, priority, superseded) = match self.slots.remove(key) {
            Some(previous) => {
                previous.job.task.transition(TaskState::Superseded);
                (
                    previous.seq,
                    previous.job.priority.max(priority),
                    Some(previous.job.task),
                )
            }
            None => {
                self.next_seq += 1;
                (self.next_seq, priority, None)
            }
        };

        let job = StreamJob {
            key: key.to_owned(),
            kind,
            target,
            priority,
            origin,
            task: task.clone(),
        };
        self.slots.insert(
            key.to_owned(),
            Slot {
                job,
                seq,
                generation,
            },
        );
        self.heap.push(Ticket {
            priority,
            seq,
            generation,
            key: key.to_owned(),
        });

        match superseded {
            Some(superseded) => EnqueueOutcome::Coalesced { task, superseded },
            None => EnqueueOutcome::Queued(task),
        }
    }

    /// Removes and returns the next job to run.
    pub fn pop(&mut self) -> Option<StreamJob> {
        while let Some(ticket) = self.heap.pop() {
            let current = self
                .slots
                .get(&ticket.key)
                .is_some_and(|slot| slot.generation == ticket.generation);
            if current {
                return self.slots.remove(&ticket.key).map(|slot| slot.job);
            }
        }
        None
    }

    /// Removes the queued job for `key`, if any, without changing its state.
    pub fn remove(&mut self, key: &str) -> Option<StreamJob> {
        let job = self.slots.remove(key).map(|slot| slot.job);
        if self.slots.is_empty() {
            self.heap.clear();
        }
        job
    }

    /// The queued job for `key`.
    pub fn get(&self, key: &str) -> Option<&StreamJob> {
        self.slots.get(key).map(|slot| &slot.job)
    }

    /// Removes every queued job, in no particular order.
    pub fn drain_all(&mut self) -> Vec<StreamJob> {
        self.heap.clear();
        self.slots.drain().map(|(_, slot)| slot.job).collect()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no job is queued.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("len", &self.slots.len())
            .field("tickets", &self.heap.len())
            .finish()
    }
}
