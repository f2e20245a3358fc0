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

//! A key-to-entry cache store with least-recently-used eviction.
//!
//! One store exists per resource kind. Every operation takes the store's own
//! lock for a short, non-blocking critical section; stores never share a lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tessera_core::config::ExpiryPolicy;
use tessera_core::{DetailTier, ResourceKind, ResourcePayload};

use crate::entry::{CacheEntry, EntrySnapshot};

/// Guards against `0.2 * 10.0` landing a hair above 2 and rounding up to 3.
const FRACTION_EPSILON: f64 = 1e-9;

/// Result of offering an upgraded payload to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The payload was installed; `previous` is the tier it replaced.
    Applied {
        /// Tier held before the upgrade.
        previous: DetailTier,
    },
    /// The payload would have lowered the tier and was released unused.
    Rejected {
        /// Tier still held.
        current: DetailTier,
    },
    /// No entry exists for the key any more; the payload was released unused.
    Missing,
}

/// Statistics about store usage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreStats {
    /// Number of live entries.
    pub entry_count: usize,
    /// Sum of the live entries' size estimates.
    pub bytes_used: u64,
    /// The store's sub-limit.
    pub limit_bytes: u64,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed by LRU eviction.
    pub evictions: u64,
    /// Entries removed because they outlived their class TTL.
    pub expirations: u64,
    /// Entries removed explicitly by callers.
    pub invalidations: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization against the sub-limit.
    pub fn utilization(&self) -> f64 {
        if self.limit_bytes == 0 {
            0.0
        } else {
            self.bytes_used as f64 / self.limit_bytes as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

struct StoreState {
    entries: HashMap<String, CacheEntry>,
    /// Logical access clock; orders accesses landing on the same `Instant`.
    clock: u64,
    counters: Counters,
}

impl StoreState {
    fn touch(&mut self, key: &str) -> Option<&CacheEntry> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        entry.last_used_at = Instant::now();
        entry.last_used_seq = clock;
        Some(entry)
    }

    fn is_expired(entry: &CacheEntry, now: Instant, policy: &ExpiryPolicy) -> bool {
        policy
            .ttl_for(entry.strategy())
            .is_some_and(|ttl| now.saturating_duration_since(entry.inserted_at) > ttl)
    }
}

/// A cache store for one resource kind.
///
/// # Example
///
/// ```
/// use tessera_core::resource::PlaceholderPayload;
/// use tessera_core::{DetailTier, ResourceKind, StrategyClass};
/// use tessera_data::{CacheEntry, CacheStore};
///
/// let store = CacheStore::new(ResourceKind::Image, 64 * 1024 * 1024);
/// store.put(CacheEntry::new(
///     "sky.png",
///     ResourceKind::Image,
///     Box::new(PlaceholderPayload::new(ResourceKind::Image)),
///     DetailTier::Low,
///     StrategyClass::Important,
/// ));
///
/// assert_eq!(store.get("sky.png").map(|e| e.tier), Some(DetailTier::Low));
/// assert_eq!(store.total_bytes(), 4 * 4 * 4);
/// ```
pub struct CacheStore {
    kind: ResourceKind,
    limit_bytes: u64,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// Creates an empty store for `kind` with a sub-limit in bytes.
    pub fn new(kind: ResourceKind, limit_bytes: u64) -> Self {
        Self {
            kind,
            limit_bytes,
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                clock: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// The kind of resource held.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The store's sub-limit in bytes.
    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Looks up an entry. A hit refreshes its recency; a miss changes nothing
    /// but the miss counter.
    pub fn get(&self, key: &str) -> Option<EntrySnapshot> {
        let mut state = self.lock();
        match state.touch(key).map(CacheEntry::snapshot) {
            Some(snapshot) => {
                state.counters.hits += 1;
                Some(snapshot)
            }
            None => {
                state.counters.misses += 1;
                None
            }
        }
    }

    /// Like [`get`](Self::get), but an entry that outlived its class TTL is
    /// removed and reported as a miss.
    pub fn get_unexpired(&self, key: &str, policy: &ExpiryPolicy) -> Option<EntrySnapshot> {
        let mut state = self.lock();
        let now = Instant::now();
        let expired = state
            .entries
            .get(key)
            .is_some_and(|entry| StoreState::is_expired(entry, now, policy));
        if expired {
            state.entries.remove(key);
            state.counters.expirations += 1;
            log::debug!("{} store: '{}' expired on lookup", self.kind, key);
        }
        drop(state);
        self.get(key)
    }

    /// Looks up an entry without refreshing its recency.
    pub fn peek(&self, key: &str) -> Option<EntrySnapshot> {
        self.lock().entries.get(key).map(CacheEntry::snapshot)
    }

    /// Returns `true` if the store holds an entry for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Runs `f` against the entry, counting it as a use.
    ///
    /// The store lock is held while `f` runs, so `f` must be short.
    pub fn with_entry<R>(&self, key: &str, f: impl FnOnce(&CacheEntry) -> R) -> Option<R> {
        let mut state = self.lock();
        let result = state.touch(key).map(f);
        if result.is_some() {
            state.counters.hits += 1;
        } else {
            state.counters.misses += 1;
        }
        result
    }

    /// Inserts an entry, replacing any entry under the same key.
    ///
    /// The replaced entry's payload is released before the new entry is
    /// installed. Returns `true` if an entry was replaced.
    pub fn put(&self, mut entry: CacheEntry) -> bool {
        let mut state = self.lock();
        state.clock += 1;
        entry.last_used_seq = state.clock;

        let key = entry.key().to_owned();
        let replaced = state.entries.remove(&key).is_some();
        state.entries.insert(key, entry);
        replaced
    }

    /// Offers an upgraded payload for an existing entry.
    ///
    /// With `allow_downgrade == false` a payload whose tier is below the cached
    /// one is rejected. A payload that is not installed is released before
    /// returning.
    pub fn apply(
        &self,
        key: &str,
        payload: Box<dyn ResourcePayload>,
        tier: DetailTier,
        allow_downgrade: bool,
    ) -> ApplyOutcome {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            drop(state);
            payload.release();
            return ApplyOutcome::Missing;
        };

        let previous = entry.tier();
        let is_regression = tier < previous && !entry.is_placeholder();
        if is_regression && !allow_downgrade {
            drop(state);
            payload.release();
            return ApplyOutcome::Rejected { current: previous };
        }

        entry.replace_payload(payload, tier);
        ApplyOutcome::Applied { previous }
    }

    /// Evicts the `ceil(fraction * len)` least recently used entries.
    ///
    /// Entries are ordered by `last_used_at`, then `inserted_at`, both
    /// ascending. Returns the number of entries removed; each removed payload
    /// is released before this returns.
    pub fn remove_lru(&self, fraction: f64) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        if count == 0 || !(fraction > 0.0) {
            return 0;
        }

        let fraction = fraction.min(1.0);
        let to_remove = ((fraction * count as f64 - FRACTION_EPSILON).ceil() as usize).min(count);

        let mut order: Vec<(Instant, Instant, u64, String)> = state
            .entries
            .values()
            .map(|e| (e.last_used_at, e.inserted_at, e.last_used_seq, e.key().to_owned()))
            .collect();
        order.sort_unstable_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

        let mut freed = 0u64;
        for (_, _, _, key) in order.into_iter().take(to_remove) {
            if let Some(entry) = state.entries.remove(&key) {
                freed += entry.size_bytes();
            }
        }
        state.counters.evictions += to_remove as u64;

        log::debug!(
            "{} store: evicted {} of {} entries ({} bytes)",
            self.kind,
            to_remove,
            count,
            freed
        );
        to_remove
    }

    /// Removes the entry for `key`. Returns `true` if one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.counters.invalidations += 1;
        }
        removed
    }

    /// Removes every entry, releasing all payloads. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        removed
    }

    /// Removes every entry older than its class TTL at `now`.
    pub fn expire_stale(&self, now: Instant, policy: &ExpiryPolicy) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| !StoreState::is_expired(entry, now, policy));
        let expired = before - state.entries.len();
        state.counters.expirations += expired as u64;
        expired
    }

    /// Sum of the live entries' size estimates, computed on demand.
    pub fn total_bytes(&self) -> u64 {
        self.lock()
            .entries
            .values()
            .map(CacheEntry::size_bytes)
            .fold(0u64, u64::saturating_add)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A read-only copy of every entry's metadata.
    pub fn iterate(&self) -> Vec<EntrySnapshot> {
        self.lock()
            .entries
            .values()
            .map(CacheEntry::snapshot)
            .collect()
    }

    /// Current statistics.
    pub fn stats(&self) -> StoreStats {
        let state = self.lock();
        StoreStats {
            entry_count: state.entries.len(),
            bytes_used: state
                .entries
                .values()
                .map(CacheEntry::size_bytes)
                .fold(0u64, u64::saturating_add),
            limit_bytes: self.limit_bytes,
            hits: state.counters.hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
            expirations: state.counters.expirations,
            invalidations: state.counters.invalidations,
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("kind", &self.kind)
            .field("limit_bytes", &self.limit_bytes)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tessera_core::resource::PlaceholderPayload;
    use tessera_core::{ResourceShape, StrategyClass};

    const MIB: u64 = 1024 * 1024;

    /// An image payload that counts its releases.
    struct CountedImage {
        width: u32,
        height: u32,
        released: Arc<AtomicUsize>,
    }

    impl ResourcePayload for CountedImage {
        fn shape(&self) -> ResourceShape {
            ResourceShape::Image {
                width: self.width,
                height: self.height,
                mipmaps: false,
            }
        }

        fn release(self: Box<Self>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn image(key: &str, side: u32, released: &Arc<AtomicUsize>) -> CacheEntry {
        CacheEntry::new(
            key,
            ResourceKind::Image,
            Box::new(CountedImage {
                width: side,
                height: side,
                released: Arc::clone(released),
            }),
            DetailTier::Medium,
            StrategyClass::Important,
        )
    }

    fn placeholder(key: &str) -> CacheEntry {
        CacheEntry::new(
            key,
            ResourceKind::Image,
            Box::new(PlaceholderPayload::new(ResourceKind::Image)),
            DetailTier::Low,
            StrategyClass::Important,
        )
    }

    #[test]
    fn test_miss_has_no_side_effect() {
        let store = CacheStore::new(ResourceKind::Image, MIB);
        assert!(store.get("absent").is_none());
        assert!(store.is_empty());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_total_is_sum_of_live_entries() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        store.put(image("a", 16, &released));
        store.put(image("b", 32, &released));
        assert_eq!(store.total_bytes(), (16 * 16 + 32 * 32) * 4);

        // Replacing keeps the total exact and releases the old payload.
        assert!(store.put(image("a", 8, &released)));
        assert_eq!(store.total_bytes(), (8 * 8 + 32 * 32) * 4);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        store.invalidate("b");
        assert_eq!(store.total_bytes(), 8 * 8 * 4);
        let sum: u64 = store.iterate().iter().map(|e| e.size_bytes).sum();
        assert_eq!(sum, store.total_bytes());
    }

    #[test]
    fn test_remove_lru_takes_the_least_recent() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        for i in 0..10 {
            store.put(image(&format!("tex{i}"), 4, &released));
        }
        // Touch everything except tex3 and tex7, so they become the oldest.
        for i in [0, 1, 2, 4, 5, 6, 8, 9] {
            assert!(store.get(&format!("tex{i}")).is_some());
        }

        assert_eq!(store.remove_lru(0.2), 2);
        assert_eq!(store.len(), 8);
        assert!(!store.contains("tex3"));
        assert!(!store.contains("tex7"));
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(store.stats().evictions, 2);
    }

    #[test]
    fn test_remove_lru_rounds_up() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        for i in 0..5 {
            store.put(image(&format!("tex{i}"), 4, &released));
        }
        assert_eq!(store.remove_lru(0.2), 1);
        assert!(!store.contains("tex0"));
        assert_eq!(store.remove_lru(0.6), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_lru_breaks_ties_by_insertion() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        store.put(image("older", 4, &released));
        store.put(image("newer", 4, &released));

        let base = Instant::now();
        {
            let mut state = store.lock();
            let older = state.entries.get_mut("older").unwrap();
            older.inserted_at = base;
            older.last_used_at = base + Duration::from_secs(2);
            older.last_used_seq = 10;
            let newer = state.entries.get_mut("newer").unwrap();
            newer.inserted_at = base + Duration::from_secs(1);
            newer.last_used_at = base + Duration::from_secs(2);
            newer.last_used_seq = 1;
        }

        assert_eq!(store.remove_lru(0.5), 1);
        assert!(!store.contains("older"));
        assert!(store.contains("newer"));
    }

    #[test]
    fn test_remove_lru_degenerate_fractions() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        assert_eq!(store.remove_lru(0.5), 0);
        store.put(image("a", 4, &released));
        assert_eq!(store.remove_lru(0.0), 0);
        assert_eq!(store.remove_lru(f64::NAN), 0);
        assert_eq!(store.remove_lru(3.0), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_upgrades_in_place() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        store.put(placeholder("sky.png"));

        let outcome = store.apply(
            "sky.png",
            Box::new(CountedImage {
                width: 64,
                height: 64,
                released: Arc::clone(&released),
            }),
            DetailTier::High,
            false,
        );
        assert_eq!(
            outcome,
            ApplyOutcome::Applied {
                previous: DetailTier::Low
            }
        );
        let entry = store.peek("sky.png").unwrap();
        assert_eq!(entry.tier, DetailTier::High);
        assert!(!entry.is_placeholder);
        assert_eq!(entry.size_bytes, 64 * 64 * 4);
        assert_eq!(store.total_bytes(), 64 * 64 * 4);
    }

    #[test]
    fn test_apply_rejects_regression_unless_allowed() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        store.put(image("sky.png", 32, &released));

        let lower = |side| {
            Box::new(CountedImage {
                width: side,
                height: side,
                released: Arc::clone(&released),
            })
        };

        assert_eq!(
            store.apply("sky.png", lower(8), DetailTier::Low, false),
            ApplyOutcome::Rejected {
                current: DetailTier::Medium
            }
        );
        assert_eq!(released.load(Ordering::SeqCst), 1, "offered payload released");
        assert_eq!(store.peek("sky.png").unwrap().tier, DetailTier::Medium);

        assert!(matches!(
            store.apply("sky.png", lower(8), DetailTier::Low, true),
            ApplyOutcome::Applied { .. }
        ));
        assert_eq!(store.peek("sky.png").unwrap().tier, DetailTier::Low);
        assert_eq!(released.load(Ordering::SeqCst), 2, "replaced payload released");
    }

    #[test]
    fn test_apply_to_missing_key_releases_payload() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        let payload = Box::new(CountedImage {
            width: 4,
            height: 4,
            released: Arc::clone(&released),
        });
        assert_eq!(
            store.apply("gone", payload, DetailTier::High, false),
            ApplyOutcome::Missing
        );
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_releases_everything() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        for i in 0..4 {
            store.put(image(&format!("tex{i}"), 4, &released));
        }
        assert_eq!(store.clear(), 4);
        assert_eq!(released.load(Ordering::SeqCst), 4);
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_dropping_store_releases_payloads() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
            store.put(image("a", 4, &released));
            store.put(image("b", 4, &released));
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expiry_by_strategy_class() {
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        let make = |key: &str, strategy| {
            CacheEntry::new(
                key,
                ResourceKind::Image,
                Box::new(PlaceholderPayload::new(ResourceKind::Image)),
                DetailTier::Low,
                strategy,
            )
        };
        store.put(make("ui/cursor.png", StrategyClass::Essential));
        store.put(make("rock.png", StrategyClass::Important));
        store.put(make("rock_preview.png", StrategyClass::Optional));

        let policy = ExpiryPolicy::default();
        let later = Instant::now() + Duration::from_secs(300);
        assert_eq!(store.expire_stale(later, &policy), 1);
        assert!(!store.contains("rock_preview.png"));

        let much_later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(store.expire_stale(much_later, &policy), 1);
        assert!(store.contains("ui/cursor.png"));
        assert_eq!(store.stats().expirations, 2);
    }

    #[test]
    fn test_get_unexpired_drops_stale_entry() {
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        store.put(placeholder("rock.png"));
        let instant_expiry = ExpiryPolicy {
            important_secs: 0,
            optional_secs: 0,
        };
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get_unexpired("rock.png", &instant_expiry).is_none());
        assert!(!store.contains("rock.png"));
    }

    #[test]
    fn test_with_entry_exposes_payload_and_refreshes_recency() {
        let released = Arc::new(AtomicUsize::new(0));
        let store = CacheStore::new(ResourceKind::Image, 64 * MIB);
        store.put(image("old", 4, &released));
        store.put(image("new", 4, &released));

        let width = store.with_entry("old", |entry| {
            entry
                .payload()
                .and_then(|p| p.as_any().downcast_ref::<CountedImage>())
                .map(|img| img.width)
        });
        assert_eq!(width, Some(Some(4)));

        // "old" was just used, so "new" is now the eviction candidate.
        store.remove_lru(0.5);
        assert!(store.contains("old"));
        assert!(!store.contains("new"));
    }
}
