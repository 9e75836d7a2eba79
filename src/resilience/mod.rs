//! # Resilience Module
//!
//! Circuit breaker patterns protecting calls to external equipment backends.
//! Each named circuit is an independent state machine gating call admission;
//! the registry manages them and aggregates their metrics.

pub mod circuit_breaker;
pub mod config;
pub mod metrics;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use registry::CircuitBreakerRegistry;
