//! # Cache Module
//!
//! Bounded in-memory cache for backend responses: TTL expiry (lazy on read,
//! eager during periodic cleanup), tag- and substring-based invalidation,
//! and dual eviction policies for entry-count and byte-budget pressure.

pub mod entry;
pub mod stats;
pub mod store;

pub use entry::{CacheEntry, SerializedSizeEstimator, SizeEstimator};
pub use stats::{CacheStats, TopEntry};
pub use store::{CacheStore, CacheWriteOptions};
