//! # Circuit Breaker Metrics
//!
//! Snapshot types for individual circuits and system-wide aggregation.
//! These feed monitoring, alerting, and the periodic metrics sweep.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metrics snapshot for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Current circuit breaker state
    pub current_state: CircuitState,

    /// Total number of calls recorded since the last reset
    pub total_calls: u64,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls
    pub failure_count: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u64,

    /// Calls counted since the last state transition
    pub calls_since_state_change: u64,

    /// When the most recent failure was recorded
    pub last_failure_at: Option<SystemTime>,

    /// When the most recent success was recorded
    pub last_success_at: Option<SystemTime>,

    /// When the circuit last changed state
    pub state_changed_at: SystemTime,

    /// Simple ratio of failures to total calls since the last reset.
    /// Not a time-windowed rate; long-lived circuits dilute recent failures.
    pub failure_rate: f64,

    /// Simple ratio of successes to total calls since the last reset
    pub success_rate: f64,

    /// Running average latency across all recorded calls
    pub average_latency: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            current_state: CircuitState::Closed,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            calls_since_state_change: 0,
            last_failure_at: None,
            last_success_at: None,
            state_changed_at: UNIX_EPOCH,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_latency: Duration::ZERO,
        }
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true, // Attempting recovery
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing dependency health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {} | Avg Latency: {}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.average_latency.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Metrics for individual circuit breakers by name
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    /// Timestamp of last metrics collection
    pub collected_at: SystemTime,
}

impl SystemCircuitBreakerMetrics {
    /// Create new system metrics
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: SystemTime::now(),
        }
    }

    /// Add metrics for a circuit breaker
    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = SystemTime::now();
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();

        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }

        counts
    }

    /// Get list of unhealthy circuit breakers
    pub fn unhealthy_circuits(&self) -> Vec<(&String, &CircuitBreakerMetrics)> {
        self.circuit_breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .collect()
    }

    /// Calculate system-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0; // No circuit breakers = healthy
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    /// Get total calls across all circuit breakers
    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|metrics| metrics.total_calls)
            .sum()
    }

    /// Get total failures across all circuit breakers
    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|metrics| metrics.failure_count)
            .sum()
    }

    /// Get system-wide failure rate
    pub fn system_failure_rate(&self) -> f64 {
        let total_calls = self.total_calls();
        if total_calls == 0 {
            return 0.0;
        }

        self.total_failures() as f64 / total_calls as f64
    }

    /// Format summary for logging
    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let closed_count = state_counts.get(&CircuitState::Closed).unwrap_or(&0);
        let open_count = state_counts.get(&CircuitState::Open).unwrap_or(&0);
        let half_open_count = state_counts.get(&CircuitState::HalfOpen).unwrap_or(&0);

        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}% | System failure rate: {:.2}%",
            self.circuit_breakers.len(),
            closed_count,
            open_count,
            half_open_count,
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CircuitBreakerMetrics::new();

        assert_eq!(metrics.total_calls, 0);
        assert_eq!(metrics.success_count, 0);
        assert_eq!(metrics.failure_count, 0);
        assert_eq!(metrics.current_state, CircuitState::Closed);
        assert!(metrics.is_healthy());
    }

    #[test]
    fn test_system_metrics_aggregation() {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let mut heating = CircuitBreakerMetrics::new();
        heating.current_state = CircuitState::Closed;
        heating.total_calls = 100;
        heating.success_count = 95;
        heating.failure_count = 5;
        heating.failure_rate = 0.05;

        let mut weather = CircuitBreakerMetrics::new();
        weather.current_state = CircuitState::Open;
        weather.total_calls = 50;
        weather.success_count = 25;
        weather.failure_count = 25;
        weather.failure_rate = 0.5;

        system_metrics.add_circuit_breaker("heating".to_string(), heating);
        system_metrics.add_circuit_breaker("weather_provider".to_string(), weather);

        assert_eq!(system_metrics.total_calls(), 150);
        assert_eq!(system_metrics.total_failures(), 30);
        assert_eq!(system_metrics.system_failure_rate(), 0.2);

        let state_counts = system_metrics.count_by_state();
        assert_eq!(state_counts.get(&CircuitState::Closed), Some(&1));
        assert_eq!(state_counts.get(&CircuitState::Open), Some(&1));

        assert_eq!(system_metrics.health_score(), 0.5);

        let unhealthy = system_metrics.unhealthy_circuits();
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0].0, "weather_provider");
    }

    #[test]
    fn test_health_calculation_by_state() {
        let mut metrics = CircuitBreakerMetrics::new();

        metrics.current_state = CircuitState::Closed;
        metrics.failure_rate = 0.05;
        assert!(metrics.is_healthy());

        metrics.failure_rate = 0.15;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::Open;
        metrics.failure_rate = 0.0;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::HalfOpen;
        assert!(metrics.is_healthy());
    }
}
