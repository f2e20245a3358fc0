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

use std::time::Instant;

use tessera_core::estimate::estimate_bytes;
use tessera_core::{DetailTier, ResourceKind, ResourcePayload, ResourceShape, StrategyClass, Vec3};

/// A cached resource and its bookkeeping.
///
/// The entry exclusively owns its payload. The payload is released when the
/// entry is dropped or when [`replace_payload`](CacheEntry::replace_payload)
/// installs a new one, and `size_bytes` always describes the payload
/// currently held.
pub struct CacheEntry {
    key: String,
    kind: ResourceKind,
    payload: Option<Box<dyn ResourcePayload>>,
    shape: ResourceShape,
    size_bytes: u64,
    tier: DetailTier,
    strategy: StrategyClass,
    anchor: Option<Vec3>,
    placeholder: bool,
    pub(crate) last_used_at: Instant,
    pub(crate) inserted_at: Instant,
    pub(crate) last_used_seq: u64,
}

impl CacheEntry {
    /// Creates an entry owning `payload` at the given tier.
    pub fn new(
        key: impl Into<String>,
        kind: ResourceKind,
        payload: Box<dyn ResourcePayload>,
        tier: DetailTier,
        strategy: StrategyClass,
    ) -> Self {
        let shape = payload.shape();
        let placeholder = payload.is_placeholder();
        let now = Instant::now();
        Self {
            key: key.into(),
            kind,
            payload: Some(payload),
            shape,
            size_bytes: estimate_bytes(&shape),
            tier,
            strategy,
            anchor: None,
            placeholder,
            last_used_at: now,
            inserted_at: now,
            last_used_seq: 0,
        }
    }

    /// Attaches a world-space anchor used for level-of-detail decisions.
    pub fn with_anchor(mut self, anchor: Option<Vec3>) -> Self {
        self.anchor = anchor;
        self
    }

    /// Releases the current payload, then installs `payload` at `tier`.
    pub fn replace_payload(&mut self, payload: Box<dyn ResourcePayload>, tier: DetailTier) {
        if let Some(previous) = self.payload.take() {
            previous.release();
        }
        self.shape = payload.shape();
        self.size_bytes = estimate_bytes(&self.shape);
        self.placeholder = payload.is_placeholder();
        self.tier = tier;
        self.payload = Some(payload);
    }

    /// The resource key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The kind of resource.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The owned payload.
    pub fn payload(&self) -> Option<&dyn ResourcePayload> {
        self.payload.as_deref()
    }

    /// Estimated footprint of the current payload.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Current fidelity tier.
    pub fn tier(&self) -> DetailTier {
        self.tier
    }

    /// Strategy class assigned at request time.
    pub fn strategy(&self) -> StrategyClass {
        self.strategy
    }

    /// World-space anchor, if the resource has one.
    pub fn anchor(&self) -> Option<Vec3> {
        self.anchor
    }

    /// Returns `true` while the entry still holds the synthesized placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// When the entry was last read.
    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// When the entry was first inserted.
    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    /// A copy of the entry's metadata.
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            key: self.key.clone(),
            kind: self.kind,
            shape: self.shape,
            size_bytes: self.size_bytes,
            tier: self.tier,
            strategy: self.strategy,
            anchor: self.anchor,
            is_placeholder: self.placeholder,
            last_used_at: self.last_used_at,
            inserted_at: self.inserted_at,
        }
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            payload.release();
        }
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("size_bytes", &self.size_bytes)
            .field("tier", &self.tier)
            .field("strategy", &self.strategy)
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

/// A read-only copy of a cache entry's metadata.
///
/// Payloads never leave their entry; callers that need the payload itself go
/// through [`CacheStore::with_entry`](crate::CacheStore::with_entry).
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    /// The resource key.
    pub key: String,
    /// The kind of resource.
    pub kind: ResourceKind,
    /// Declared dimensions of the payload.
    pub shape: ResourceShape,
    /// Estimated footprint.
    pub size_bytes: u64,
    /// Current fidelity tier.
    pub tier: DetailTier,
    /// Strategy class.
    pub strategy: StrategyClass,
    /// World-space anchor.
    pub anchor: Option<Vec3>,
    /// Whether the entry still holds the placeholder.
    pub is_placeholder: bool,
    /// When the entry was last read.
    pub last_used_at: Instant,
    /// When the entry was first inserted.
    pub inserted_at: Instant,
}
