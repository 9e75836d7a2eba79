//! Cache statistics snapshot types.

use serde::Serialize;
use std::time::Duration;

/// One of the most-accessed entries, reported by [`super::CacheStore::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct TopEntry {
    pub key: String,
    pub access_count: u64,
    pub size_bytes: usize,
}

/// Point-in-time statistics for the cache store
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Live entries at snapshot time
    pub entry_count: usize,

    /// Estimated bytes held at snapshot time
    pub total_bytes: usize,

    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,

    /// hits / (hits + misses), 0.0 when no lookups have happened
    pub hit_rate: f64,
    pub miss_rate: f64,

    /// Average wall-clock latency of `get` lookups
    pub average_lookup_latency: Duration,

    /// Top entries by access count, most accessed first
    pub top_entries: Vec<TopEntry>,
}
