//! # Circuit Breaker Implementation
//!
//! Per-dependency fault isolation with three states: Closed (normal
//! operation), Open (failing fast), and HalfOpen (testing recovery under a
//! bounded call quota). State and counters are kept in lock-free atomics so
//! `record_success`/`record_failure` stay cheap on the hot path.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Get current epoch nanos from SystemTime
#[inline]
fn epoch_nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

fn epoch_nanos_to_system_time(nanos: u64) -> Option<SystemTime> {
    if nanos == 0 {
        None
    } else {
        Some(UNIX_EPOCH + Duration::from_nanos(nanos))
    }
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are admitted
    Closed = 0,
    /// Failure mode - admission refused until the recovery timeout elapses
    Open = 1,
    /// Testing recovery - a bounded quota of probe calls is admitted
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Core circuit breaker with atomic state management.
///
/// The machine cycles indefinitely: the Nth consecutive failure opens it,
/// the recovery timeout admits a half-open probe, a single probe success
/// closes it and a single probe failure reopens it. [`CircuitBreaker::reset`]
/// is the manual override back to Closed.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Circuit name for logging and metrics
    name: String,

    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,

    /// Replaceable configuration; snapshot once per call via `config()`
    config: RwLock<CircuitBreakerConfig>,

    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU64,
    calls_since_state_change: AtomicU64,
    total_duration_nanos: AtomicU64,

    /// Epoch nanos of the most recent failure (0 = never failed).
    /// Recovery eligibility is measured from here, not from the transition.
    last_failure_at_nanos: AtomicU64,
    last_success_at_nanos: AtomicU64,
    state_changed_at_nanos: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            circuit = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs(),
            half_open_max_calls = config.half_open_max_calls,
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config: RwLock::new(config),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            calls_since_state_change: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
            last_failure_at_nanos: AtomicU64::new(0),
            last_success_at_nanos: AtomicU64::new(0),
            state_changed_at_nanos: AtomicU64::new(epoch_nanos_now()),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current configuration.
    ///
    /// Callers take one snapshot per logical call so a concurrent
    /// [`CircuitBreaker::replace_config`] never changes semantics mid-call.
    pub fn config(&self) -> CircuitBreakerConfig {
        self.config.read().clone()
    }

    /// Replace the configuration wholesale; applies to subsequent calls
    pub fn replace_config(&self, config: CircuitBreakerConfig) {
        info!(
            circuit = %self.name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs(),
            "Circuit breaker configuration replaced"
        );
        *self.config.write() = config;
    }

    /// Try to admit a call under the current state.
    ///
    /// Open circuits transition to half-open (and admit the probe) once the
    /// recovery timeout has elapsed since the last failure. Half-open
    /// circuits admit up to `half_open_max_calls` since the transition.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => {
                self.calls_since_state_change.fetch_add(1, Ordering::Relaxed);
                true
            }
            CircuitState::Open => {
                let last_failure = self.last_failure_at_nanos.load(Ordering::Acquire);
                if last_failure == 0 {
                    // Open with no recorded failure - only reachable through a
                    // forced transition; admit rather than wedge the circuit.
                    warn!(circuit = %self.name, "Circuit open but no failure recorded");
                    return true;
                }

                let elapsed = epoch_nanos_now().saturating_sub(last_failure);
                let recovery = self.config.read().recovery_timeout.as_nanos() as u64;

                if elapsed >= recovery {
                    self.transition_to_half_open();
                    self.calls_since_state_change.fetch_add(1, Ordering::Relaxed);
                    true
                } else {
                    debug!(
                        circuit = %self.name,
                        remaining_ms = (recovery.saturating_sub(elapsed)) / 1_000_000,
                        "Admission refused, recovery timeout not elapsed"
                    );
                    false
                }
            }
            CircuitState::HalfOpen => {
                let quota = u64::from(self.config.read().half_open_max_calls);
                self.calls_since_state_change
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |calls| {
                        if calls < quota {
                            Some(calls + 1)
                        } else {
                            None
                        }
                    })
                    .is_ok()
            }
        }
    }

    /// Record a successful operation (lock-free)
    pub fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.last_success_at_nanos
            .store(epoch_nanos_now(), Ordering::Release);

        debug!(
            circuit = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        match self.state() {
            CircuitState::Closed => {
                // Any success zeroes the failure streak
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                // A single probe success closes the circuit
                self.transition_to_closed();
            }
            CircuitState::Open => {
                // Late result from a call admitted before the transition
                warn!(circuit = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation (lock-free)
    pub fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.last_failure_at_nanos
            .store(epoch_nanos_now(), Ordering::Release);

        error!(
            circuit = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                let threshold = u64::from(self.config.read().failure_threshold);
                if failures >= threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state immediately reopens
                self.transition_to_open();
            }
            CircuitState::Open => {
                // Already open, the failure timestamp above extends recovery
            }
        }
    }

    /// Manual override: force the circuit back to Closed and zero counters.
    ///
    /// Also resets the totals underlying `failure_rate`, which is defined
    /// as the simple ratio of failures to calls since the last reset.
    pub fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.calls_since_state_change.store(0, Ordering::Relaxed);
        self.total_duration_nanos.store(0, Ordering::Relaxed);
        self.last_failure_at_nanos.store(0, Ordering::Release);
        self.last_success_at_nanos.store(0, Ordering::Release);
        self.state_changed_at_nanos
            .store(epoch_nanos_now(), Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        warn!(circuit = %self.name, "Circuit breaker manually reset to closed");
    }

    /// Transition to closed state (normal operation)
    fn transition_to_closed(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.calls_since_state_change.store(0, Ordering::Relaxed);
        self.state_changed_at_nanos
            .store(epoch_nanos_now(), Ordering::Release);

        // Store state last (after counters reset)
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        info!(
            circuit = %self.name,
            total_calls = self.total_calls.load(Ordering::Relaxed),
            "Circuit breaker closed (recovered)"
        );
    }

    /// Transition to open state (failing fast)
    fn transition_to_open(&self) {
        self.calls_since_state_change.store(0, Ordering::Relaxed);
        self.state_changed_at_nanos
            .store(epoch_nanos_now(), Ordering::Release);

        // Store state last
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        error!(
            circuit = %self.name,
            consecutive_failures = self.consecutive_failures.load(Ordering::Relaxed),
            recovery_timeout_secs = self.config.read().recovery_timeout.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    /// Transition to half-open state (testing recovery)
    fn transition_to_half_open(&self) {
        self.calls_since_state_change.store(0, Ordering::Relaxed);
        self.state_changed_at_nanos
            .store(epoch_nanos_now(), Ordering::Release);

        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        info!(
            circuit = %self.name,
            half_open_max_calls = self.config.read().half_open_max_calls,
            "Circuit breaker half-open (testing recovery)"
        );
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration_nanos = self.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, success_rate, average_latency) = if total_calls > 0 {
            (
                failure_count as f64 / total_calls as f64,
                success_count as f64 / total_calls as f64,
                Duration::from_nanos(total_duration_nanos / total_calls),
            )
        } else {
            (0.0, 0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            current_state: self.state(),
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            calls_since_state_change: self.calls_since_state_change.load(Ordering::Relaxed),
            last_failure_at: epoch_nanos_to_system_time(
                self.last_failure_at_nanos.load(Ordering::Acquire),
            ),
            last_success_at: epoch_nanos_to_system_time(
                self.last_success_at_nanos.load(Ordering::Acquire),
            ),
            state_changed_at: epoch_nanos_to_system_time(
                self.state_changed_at_nanos.load(Ordering::Acquire),
            )
            .unwrap_or(UNIX_EPOCH),
            failure_rate,
            success_rate,
            average_latency,
        }
    }
}
