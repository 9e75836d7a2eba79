//! Cache entry bookkeeping and size estimation.

use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// A single cached value with its bookkeeping.
///
/// An entry is logically absent once its TTL has elapsed; absence is
/// enforced lazily on read and eagerly during periodic cleanup. Owned
/// exclusively by the cache store and mutated only through its operations.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) data: Value,
    pub(crate) created_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) access_count: u64,
    pub(crate) last_accessed_at: Instant,
    pub(crate) tags: HashSet<String>,
    pub(crate) size_bytes: usize,
}

impl CacheEntry {
    pub(crate) fn new(data: Value, ttl: Duration, tags: HashSet<String>, size_bytes: usize) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
            tags,
            size_bytes,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }
}

/// Pluggable strategy estimating the in-memory footprint of a value.
///
/// Kept behind a trait so the heuristic can be replaced with exact
/// accounting without touching eviction logic.
pub trait SizeEstimator: Send + Sync {
    fn estimate(&self, value: &Value) -> usize;
}

/// Default estimator: roughly twice the serialized byte length.
///
/// A cheap proxy for in-memory footprint, not an exact count.
#[derive(Debug, Default)]
pub struct SerializedSizeEstimator;

impl SizeEstimator for SerializedSizeEstimator {
    fn estimate(&self, value: &Value) -> usize {
        serde_json::to_string(value)
            .map(|serialized| serialized.len() * 2)
            .unwrap_or(64)
    }
}
