//! # Executor Module
//!
//! The resilient request executor and its retry/backoff schedule. Composes
//! the circuit breaker registry and the response cache into a single
//! logical-call pipeline with timeouts and fallback substitution.

pub mod backoff;
pub mod executor;

pub use backoff::RetryPolicy;
pub use executor::{Fallback, ResilientExecutor};
