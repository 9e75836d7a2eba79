#![allow(clippy::doc_markdown)] // Allow technical terms like DashMap, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Equipment Core
//!
//! Resilience and caching core protecting and accelerating calls from the
//! application to an external equipment-management backend.
//!
//! ## Overview
//!
//! Three cooperating components:
//!
//! - **Cache Store** - bounded in-memory response cache with TTL expiry,
//!   tag/substring invalidation, and dual eviction policies (usage-based
//!   for entry-count pressure, size-based for byte pressure)
//! - **Circuit Breaker Registry** - named, per-dependency circuit breakers
//!   with lock-free state machines, equipment-class presets, and aggregated
//!   system metrics
//! - **Resilient Request Executor** - orchestrates a logical call: cache
//!   lookup, circuit admission, timed attempt with retry and exponential
//!   backoff, cache population, fallback on exhaustion
//!
//! ## Module Organization
//!
//! - [`cache`] - Bounded TTL cache with eviction and invalidation
//! - [`resilience`] - Circuit breakers, registry, and metrics
//! - [`executor`] - Retrying executor with backoff and fallback
//! - [`transport`] - Abstract downstream transport boundary
//! - [`telemetry`] - Performance sampling and the event sink boundary
//! - [`config`] - Typed configuration with environment overrides
//! - [`errors`] - Error taxonomy driving retry policy
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust
//! use equipment_core::{CoreConfig, ResilientExecutor};
//!
//! let config = CoreConfig::default();
//! let executor = ResilientExecutor::from_config(&config);
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod resilience;
pub mod telemetry;
pub mod transport;

pub use cache::{CacheStats, CacheStore, CacheWriteOptions};
pub use config::{CacheSettings, CircuitSettings, CircuitTuning, CoreConfig, PerformanceSettings};
pub use errors::{ExecutorError, ExecutorResult};
pub use executor::{Fallback, ResilientExecutor, RetryPolicy};
pub use logging::init_tracing;
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerRegistry,
    CircuitState, SystemCircuitBreakerMetrics,
};
pub use telemetry::{EventSink, PerformanceSample, PerformanceTracker};
pub use transport::{HttpMethod, Transport, TransportRequest, TransportResponse};
