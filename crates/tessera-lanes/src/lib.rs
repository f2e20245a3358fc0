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

//! # Tessera Lanes
//!
//! The hot-path pipelines of the manager: the streaming job queue and its
//! single-job drain, the level-of-detail lane, and the cleanup lane.

#![warn(missing_docs)]

pub mod cleanup;
pub mod lod;
pub mod queue;
pub mod streaming;

pub use cleanup::{CleanupLane, CleanupReport};
pub use lod::{LodDecision, LodLane};
pub use queue::{EnqueueOutcome, JobOrigin, JobQueue, StreamJob};
pub use streaming::{DrainOutcome, RequestOptions, ResourceHandle, StreamingLane};
