//! # Cache Store
//!
//! Bounded, TTL-aware in-memory store with tag- and substring-based
//! invalidation and two complementary eviction policies:
//!
//! - **Usage-based** (ascending `(access_count, last_accessed_at)`) trims
//!   entry-count overflow - least-used, least-recently-used first.
//! - **Size-based** (descending `size / (access_count + 1)`) trims
//!   byte-usage overflow - large, rarely-used entries first.
//!
//! A single byte-budget policy would repeatedly evict small hot entries
//! under a byte squeeze; a single count-budget policy would keep huge cold
//! entries. The split lets each dimension be trimmed independently.

use crate::cache::entry::{CacheEntry, SerializedSizeEstimator, SizeEstimator};
use crate::cache::stats::{CacheStats, TopEntry};
use crate::config::CacheSettings;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-write options: TTL override and invalidation tags
#[derive(Debug, Clone, Default)]
pub struct CacheWriteOptions {
    /// Entry TTL; falls back to the store's default when absent
    pub ttl: Option<Duration>,

    /// Tags for bulk invalidation after external mutations
    pub tags: Vec<String>,
}

impl CacheWriteOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

enum Lookup {
    Hit(Value),
    Expired,
    Miss,
}

/// Bounded in-memory response cache.
///
/// Constructed explicitly and shared via `Arc`; never an ambient global,
/// so each test gets its own instance.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    settings: RwLock<CacheSettings>,
    estimator: Box<dyn SizeEstimator>,

    total_bytes: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    lookup_count: AtomicU64,
    lookup_nanos: AtomicU64,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entry_count", &self.entries.len())
            .field("total_bytes", &self.total_bytes.load(Ordering::Relaxed))
            .field("settings", &*self.settings.read())
            .finish()
    }
}

/// 80% target used by `ensure_space`, rounded up so tiny caps stay usable
fn shrink_target(maximum: usize) -> usize {
    ((maximum * 4) + 4) / 5
}

impl CacheStore {
    /// Create a store with the default serialized-length size estimator
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_estimator(settings, Box::new(SerializedSizeEstimator))
    }

    /// Create a store with a custom size-estimation strategy
    pub fn with_estimator(settings: CacheSettings, estimator: Box<dyn SizeEstimator>) -> Self {
        info!(
            max_entries = settings.max_entries,
            max_total_bytes = settings.max_total_bytes,
            default_ttl_secs = settings.default_ttl_secs,
            "Cache store initialized"
        );

        Self {
            entries: DashMap::new(),
            settings: RwLock::new(settings),
            estimator,
            total_bytes: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            lookup_count: AtomicU64::new(0),
            lookup_nanos: AtomicU64::new(0),
        }
    }

    /// Replace the capacity settings; affects subsequent evictions only
    pub fn update_settings(&self, settings: CacheSettings) {
        info!(
            max_entries = settings.max_entries,
            max_total_bytes = settings.max_total_bytes,
            "Cache settings replaced"
        );
        *self.settings.write() = settings;
    }

    /// Get the cached value for a key if present and unexpired.
    ///
    /// An expired entry is removed on the spot and reported as absent.
    /// Hits bump the entry's access count and recency.
    pub fn get(&self, key: &str) -> Option<Value> {
        let started = Instant::now();
        let now = Instant::now();

        let lookup = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.is_expired(now) {
                    Lookup::Expired
                } else {
                    entry.touch(now);
                    Lookup::Hit(entry.data.clone())
                }
            }
            None => Lookup::Miss,
        };

        let result = match lookup {
            Lookup::Hit(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Expired => {
                self.remove_entry(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        self.lookup_count.fetch_add(1, Ordering::Relaxed);
        self.lookup_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);

        result
    }

    /// Insert or replace a value, evicting first if capacity requires it
    pub fn set(&self, key: &str, value: Value, options: CacheWriteOptions) {
        let size_bytes = self.estimator.estimate(&value);
        self.ensure_space(size_bytes);

        let ttl = options.ttl.unwrap_or_else(|| self.settings.read().default_ttl());
        let tags: HashSet<String> = options.tags.into_iter().collect();
        let entry = CacheEntry::new(value, ttl, tags, size_bytes);

        if let Some(previous) = self.entries.insert(key.to_string(), entry) {
            self.total_bytes
                .fetch_sub(previous.size_bytes, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(size_bytes, Ordering::Relaxed);

        debug!(key = key, size_bytes = size_bytes, "Cache SET");
    }

    /// Remove a single key; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.remove_entry(key).is_some();
        if removed {
            debug!(key = key, "Cache DEL");
        }
        removed
    }

    /// Remove every entry carrying the tag; returns the removal count.
    ///
    /// Used by write operations to keep the cache consistent with external
    /// mutations.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().tags.contains(tag))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in &keys {
            if self.remove_entry(key).is_some() {
                removed += 1;
            }
        }

        debug!(tag = tag, removed = removed, "Cache invalidated by tag");
        removed
    }

    /// Remove every entry whose key contains the pattern; returns the count
    pub fn invalidate_by_substring(&self, pattern: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().contains(pattern))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in &keys {
            if self.remove_entry(key).is_some() {
                removed += 1;
            }
        }

        debug!(
            pattern = pattern,
            removed = removed,
            "Cache invalidated by key substring"
        );
        removed
    }

    /// Return the cached value or compute, store, and return it.
    ///
    /// The factory is invoked at most once per call. There is no
    /// cross-caller single-flight: two concurrent callers that both miss
    /// the same key will both invoke the factory. Callers relying on
    /// request coalescing must layer it on top.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        options: CacheWriteOptions,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = factory().await?;
        self.set(key, value.clone(), options);
        Ok(value)
    }

    /// Periodic cleanup: expired sweep, then trim any overflow back to the
    /// configured maxima using the two eviction policies.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        for key in &expired {
            if self.remove_entry(key).is_some() {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (max_entries, max_bytes) = {
            let settings = self.settings.read();
            (settings.max_entries, settings.max_total_bytes)
        };

        let entry_count = self.entries.len();
        if entry_count > max_entries {
            self.evict_by_usage(entry_count - max_entries);
        }

        let bytes = self.total_bytes.load(Ordering::Relaxed);
        if bytes > max_bytes {
            self.evict_by_size(bytes - max_bytes);
        }

        debug!(
            expired = expired.len(),
            entry_count = self.entries.len(),
            total_bytes = self.total_bytes.load(Ordering::Relaxed),
            "Cache cleanup pass complete"
        );
    }

    /// Spawn the periodic cleanup as an explicit background task.
    ///
    /// Returns the task handle; aborting it stops the cleanup loop.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = store.settings.read().cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.cleanup();
            }
        })
    }

    /// Point-in-time statistics including the top-N entries by access count
    pub fn stats(&self, top_n: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let (hit_rate, miss_rate) = if lookups > 0 {
            (hits as f64 / lookups as f64, misses as f64 / lookups as f64)
        } else {
            (0.0, 0.0)
        };

        let lookup_count = self.lookup_count.load(Ordering::Relaxed);
        let average_lookup_latency = if lookup_count > 0 {
            Duration::from_nanos(self.lookup_nanos.load(Ordering::Relaxed) / lookup_count)
        } else {
            Duration::ZERO
        };

        let mut top_entries: Vec<TopEntry> = self
            .entries
            .iter()
            .map(|entry| TopEntry {
                key: entry.key().clone(),
                access_count: entry.value().access_count,
                size_bytes: entry.value().size_bytes,
            })
            .collect();
        top_entries.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        top_entries.truncate(top_n);

        CacheStats {
            entry_count: self.entries.len(),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate,
            miss_rate,
            average_lookup_latency,
            top_entries,
        }
    }

    /// Live entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated bytes currently held
    pub fn total_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Evict until the projected usage fits within 80% of both caps, or no
    /// smaller eviction is possible.
    fn ensure_space(&self, incoming_bytes: usize) {
        let (max_entries, max_bytes) = {
            let settings = self.settings.read();
            (settings.max_entries, settings.max_total_bytes)
        };

        let target_entries = shrink_target(max_entries).max(1);
        let projected_entries = self.entries.len() + 1;
        if projected_entries > target_entries {
            self.evict_by_usage(projected_entries - target_entries);
        }

        let target_bytes = shrink_target(max_bytes);
        let projected_bytes = self.total_bytes.load(Ordering::Relaxed) + incoming_bytes;
        if projected_bytes > target_bytes {
            self.evict_by_size(projected_bytes - target_bytes);
        }
    }

    /// Usage-based eviction: least-used, least-recently-used entries first
    fn evict_by_usage(&self, count: usize) {
        let mut candidates: Vec<(String, u64, Instant)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().access_count,
                    entry.value().last_accessed_at,
                )
            })
            .collect();

        candidates.sort_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)));

        for (key, access_count, _) in candidates.into_iter().take(count) {
            if self.remove_entry(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, access_count = access_count, "Evicted (usage policy)");
            }
        }
    }

    /// Size-based eviction: large, rarely-used entries first, until the
    /// freed byte total reaches the target
    fn evict_by_size(&self, needed_bytes: usize) {
        let mut candidates: Vec<(String, usize, f64)> = self
            .entries
            .iter()
            .map(|entry| {
                let size = entry.value().size_bytes;
                let score = size as f64 / (entry.value().access_count + 1) as f64;
                (entry.key().clone(), size, score)
            })
            .collect();

        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut freed = 0usize;
        for (key, size, score) in candidates {
            if freed >= needed_bytes {
                break;
            }
            if self.remove_entry(&key).is_some() {
                freed += size;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, size_bytes = size, score = score, "Evicted (size policy)");
            }
        }
    }

    fn remove_entry(&self, key: &str) -> Option<CacheEntry> {
        let (_, entry) = self.entries.remove(key)?;
        self.total_bytes
            .fetch_sub(entry.size_bytes, Ordering::Relaxed);
        Some(entry)
    }
}
