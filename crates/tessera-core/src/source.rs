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

//! The contract through which streaming jobs fetch and decode resources.

use crate::error::FetchError;
use crate::resource::{DetailTier, ResourceKind, ResourcePayload};

/// Describes the resource a streaming job wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest<'a> {
    /// The stable resource key (its source location).
    pub key: &'a str,
    /// The kind of resource expected.
    pub kind: ResourceKind,
    /// The tier the job is aiming for.
    pub target: DetailTier,
}

/// A decoded resource produced by a [`ResourceSource`].
pub struct FetchedResource {
    /// The decoded payload. Ownership moves into the cache entry.
    pub payload: Box<dyn ResourcePayload>,
    /// The tier actually produced, which may differ from the requested target.
    pub tier: DetailTier,
}

impl FetchedResource {
    /// Wraps a payload produced at the given tier.
    pub fn new(payload: impl ResourcePayload, tier: DetailTier) -> Self {
        Self {
            payload: Box::new(payload),
            tier,
        }
    }
}

impl std::fmt::Debug for FetchedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResource")
            .field("shape", &self.payload.shape())
            .field("tier", &self.tier)
            .finish()
    }
}

/// Fetches and decodes resources for the streaming drain lane.
///
/// `fetch` may be slow; it is only ever called from the drain, one job at a
/// time, and never while a cache store lock is held. A single attempt is made
/// per job.
pub trait ResourceSource: Send + Sync {
    /// Produces the resource described by `request`.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource, FetchError>;
}
