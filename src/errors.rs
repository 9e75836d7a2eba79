//! # Executor Error Taxonomy
//!
//! Structured error types surfaced by the resilient request executor.
//! The taxonomy drives retry policy: client-class errors are never retried,
//! server/timeout/network errors are retried per the backoff schedule, and
//! circuit-open rejections never consume a retry budget.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the resilient request executor
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The attempt exceeded the configured call timeout
    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// No response was received from the downstream transport
    #[error("network error: {message}")]
    Network { message: String },

    /// 4xx-equivalent response - not retried, surfaced immediately
    #[error("client error (status {status}): {message}")]
    Client { status: u16, message: String },

    /// 5xx-equivalent response - retried up to the configured maximum
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Admission was refused by the circuit breaker, no attempt was made
    #[error("circuit breaker is open for {circuit}")]
    CircuitOpen { circuit: String },

    /// Both the fallback function and the fallback value were unavailable
    /// or themselves failed
    #[error("fallback exhausted for {circuit}: {message}")]
    FallbackExhausted { circuit: String, message: String },
}

impl ExecutorError {
    /// Build a network error from any displayable cause
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Whether a further attempt could plausibly succeed.
    ///
    /// Client errors are deterministic rejections; circuit-open and
    /// fallback-exhausted errors are terminal by construction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network { .. } | Self::Server { .. }
        )
    }

    /// Stable category label used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Network { .. } => "network",
            Self::Client { .. } => "client",
            Self::Server { .. } => "server",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::FallbackExhausted { .. } => "fallback_exhausted",
        }
    }
}

/// Result alias used throughout the executor and transport layers
pub type ExecutorResult<T> = Result<T, ExecutorError>;
