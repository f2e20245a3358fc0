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

//! The three per-kind stores and the budget snapshot computed across them.

use std::sync::Arc;
use std::time::Instant;

use tessera_core::config::ExpiryPolicy;
use tessera_core::{ManagerConfig, ResourceKind};

use crate::entry::EntrySnapshot;
use crate::store::CacheStore;

/// Usage of a single kind's store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindUsage {
    /// The kind of resource.
    pub kind: ResourceKind,
    /// Bytes currently held by the store.
    pub bytes: u64,
    /// The store's sub-limit.
    pub limit_bytes: u64,
    /// `bytes / limit_bytes`.
    pub ratio: f64,
    /// Number of live entries.
    pub entries: usize,
}

/// A point-in-time reading of memory usage across every store.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSnapshot {
    /// Authoritative total usage in bytes.
    pub total_bytes_used: u64,
    /// The overall limit.
    pub limit_bytes: u64,
    /// `total_bytes_used / limit_bytes`.
    pub usage_ratio: f64,
    /// Per-kind breakdown, in [`ResourceKind::ALL`] order.
    pub per_kind: Vec<KindUsage>,
    /// What the host reported for the process heap, when available.
    pub host_heap_bytes: Option<u64>,
}

impl BudgetSnapshot {
    /// The highest of the overall ratio and each per-kind ratio.
    pub fn worst_ratio(&self) -> f64 {
        self.per_kind
            .iter()
            .map(|usage| usage.ratio)
            .fold(self.usage_ratio, f64::max)
    }

    /// Usage for one kind.
    pub fn kind(&self, kind: ResourceKind) -> Option<&KindUsage> {
        self.per_kind.iter().find(|usage| usage.kind == kind)
    }
}

fn ratio(bytes: u64, limit: u64) -> f64 {
    if limit == 0 {
        0.0
    } else {
        bytes as f64 / limit as f64
    }
}

/// One [`CacheStore`] per resource kind, sharing an overall limit.
#[derive(Debug, Clone)]
pub struct StoreSet {
    image: Arc<CacheStore>,
    mesh: Arc<CacheStore>,
    buffer: Arc<CacheStore>,
    total_limit_bytes: u64,
}

impl StoreSet {
    /// Creates empty stores sized from the configuration's limits.
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            image: Arc::new(CacheStore::new(
                ResourceKind::Image,
                config.limit_for(ResourceKind::Image),
            )),
            mesh: Arc::new(CacheStore::new(
                ResourceKind::Mesh,
                config.limit_for(ResourceKind::Mesh),
            )),
            buffer: Arc::new(CacheStore::new(
                ResourceKind::Buffer,
                config.limit_for(ResourceKind::Buffer),
            )),
            total_limit_bytes: config.total_limit_bytes,
        }
    }

    /// The store holding resources of `kind`.
    pub fn store(&self, kind: ResourceKind) -> &Arc<CacheStore> {
        match kind {
            ResourceKind::Image => &self.image,
            ResourceKind::Mesh => &self.mesh,
            ResourceKind::Buffer => &self.buffer,
        }
    }

    /// Iterates over the stores in [`ResourceKind::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CacheStore>> {
        ResourceKind::ALL.into_iter().map(move |kind| self.store(kind))
    }

    /// The overall limit in bytes.
    pub fn total_limit_bytes(&self) -> u64 {
        self.total_limit_bytes
    }

    /// Finds `key` in whichever store holds it, without refreshing recency.
    pub fn find(&self, key: &str) -> Option<EntrySnapshot> {
        self.iter().find_map(|store| store.peek(key))
    }

    /// Sum of every store's usage.
    pub fn total_bytes(&self) -> u64 {
        self.iter()
            .map(|store| store.total_bytes())
            .fold(0u64, u64::saturating_add)
    }

    /// Computes a snapshot from the cache sum alone.
    ///
    /// `host_heap_bytes` is recorded for diagnostics and does not feed the ratio.
    pub fn snapshot(&self, host_heap_bytes: Option<u64>) -> BudgetSnapshot {
        let per_kind: Vec<KindUsage> = self
            .iter()
            .map(|store| {
                let stats = store.stats();
                KindUsage {
                    kind: store.kind(),
                    bytes: stats.bytes_used,
                    limit_bytes: stats.limit_bytes,
                    ratio: ratio(stats.bytes_used, stats.limit_bytes),
                    entries: stats.entry_count,
                }
            })
            .collect();
        let total = per_kind
            .iter()
            .map(|usage| usage.bytes)
            .fold(0u64, u64::saturating_add);

        BudgetSnapshot {
            total_bytes_used: total,
            limit_bytes: self.total_limit_bytes,
            usage_ratio: ratio(total, self.total_limit_bytes),
            per_kind,
            host_heap_bytes,
        }
    }

    /// Removes expired entries from every store.
    pub fn expire_stale(&self, now: Instant, policy: &ExpiryPolicy) -> usize {
        self.iter().map(|store| store.expire_stale(now, policy)).sum()
    }

    /// Empties every store. Returns how many entries were removed.
    pub fn clear_all(&self) -> usize {
        self.iter().map(|store| store.clear()).sum()
    }
}
