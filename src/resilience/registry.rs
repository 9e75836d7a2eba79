//! # Circuit Breaker Registry
//!
//! A named set of independent circuit breakers, one per logical dependency
//! or equipment class. Breakers are created lazily on first use with the
//! preset matched by name; unknown names get the most conservative default.

use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, SystemCircuitBreakerMetrics,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Registry of circuit breakers by circuit name.
///
/// Constructed explicitly and passed by reference (no ambient global), so
/// tests get clean per-instance state.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    /// Create a registry with per-circuit configuration overrides.
    ///
    /// Overridden circuits are pre-registered; all others are still created
    /// lazily from their name-matched preset.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, CircuitBreakerConfig)>,
    {
        let registry = Self::new();
        for (name, config) in overrides {
            registry
                .breakers
                .insert(name.clone(), Arc::new(CircuitBreaker::new(name, config)));
        }
        registry
    }

    /// Get or lazily create the circuit breaker for a name
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        let created = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(circuit = name, "Creating circuit breaker from preset");
                Arc::new(CircuitBreaker::new(
                    name.to_string(),
                    CircuitBreakerConfig::for_circuit_name(name),
                ))
            });

        Arc::clone(created.value())
    }

    /// All registered circuit names
    pub fn circuit_names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Metrics snapshot for one circuit, if it has been created
    pub fn metrics(&self, name: &str) -> Option<CircuitBreakerMetrics> {
        self.breakers.get(name).map(|b| b.metrics())
    }

    /// System-wide metrics across all registered circuits
    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Manually reset one circuit to closed, zeroing its counters
    pub fn reset(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every registered circuit (emergency recovery)
    pub fn reset_all(&self) {
        warn!("Resetting all circuit breakers to closed");
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Replace a circuit's configuration wholesale.
    ///
    /// Creates the breaker if it does not exist yet; the new configuration
    /// applies starting with the next call.
    pub fn configure(&self, name: &str, config: CircuitBreakerConfig) -> Result<(), String> {
        config.validate()?;
        self.breaker(name).replace_config(config);
        Ok(())
    }

    /// Apply a partial tuning on top of a circuit's current configuration.
    ///
    /// Unset fields keep their current value; the resolved configuration is
    /// validated before it replaces the old one.
    pub fn tune(&self, name: &str, tuning: &crate::config::CircuitTuning) -> Result<(), String> {
        let breaker = self.breaker(name);
        let config = tuning.apply_to(breaker.config());
        config.validate()?;
        breaker.replace_config(config);
        Ok(())
    }

    /// Overall health score across circuits (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        self.system_metrics().health_score()
    }

    /// Spawn the periodic metrics sweep as an explicit background task.
    ///
    /// Returns the task handle; aborting it stops the sweep. This replaces
    /// annotation-scheduled jobs with a handle the owner controls.
    pub fn spawn_metrics_reporter(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let metrics = registry.system_metrics();
                if !metrics.circuit_breakers.is_empty() {
                    info!(
                        health_score = metrics.health_score(),
                        summary = %metrics.format_summary(),
                        "Circuit breaker sweep"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;

    #[test]
    fn test_lazy_creation_uses_name_matched_preset() {
        let registry = CircuitBreakerRegistry::new();

        let breaker = registry.breaker("air_conditioning");
        assert_eq!(breaker.config().failure_threshold, 3);

        let breaker = registry.breaker("unknown_backend");
        assert_eq!(breaker.config().half_open_max_calls, 1);
    }

    #[test]
    fn test_breaker_is_shared_instance() {
        let registry = CircuitBreakerRegistry::new();

        let first = registry.breaker("heating");
        let second = registry.breaker("heating");
        assert!(Arc::ptr_eq(&first, &second));

        assert_eq!(registry.circuit_names().len(), 1);
    }

    #[test]
    fn test_overrides_preregister_circuits() {
        let mut config = CircuitBreakerConfig::default();
        config.failure_threshold = 7;

        let registry =
            CircuitBreakerRegistry::with_overrides([("heating".to_string(), config)]);
        assert_eq!(registry.breaker("heating").config().failure_threshold, 7);
    }

    #[test]
    fn test_reset_returns_false_for_unknown_circuit() {
        let registry = CircuitBreakerRegistry::new();
        assert!(!registry.reset("never_used"));

        registry.breaker("ventilation");
        assert!(registry.reset("ventilation"));
    }

    #[test]
    fn test_configure_rejects_invalid_config() {
        let registry = CircuitBreakerRegistry::new();
        let mut config = CircuitBreakerConfig::default();
        config.failure_threshold = 0;

        assert!(registry.configure("heating", config).is_err());
    }

    #[test]
    fn test_configure_applies_to_existing_breaker() {
        let registry = CircuitBreakerRegistry::new();
        let breaker = registry.breaker("weather_provider");

        let mut config = breaker.config();
        config.failure_threshold = 1;
        registry.configure("weather_provider", config).unwrap();

        breaker.record_failure(Duration::from_millis(1));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_tune_keeps_unset_fields() {
        let registry = CircuitBreakerRegistry::new();
        let before = registry.breaker("heating").config();

        let tuning = crate::config::CircuitTuning {
            failure_threshold: Some(8),
            ..Default::default()
        };
        registry.tune("heating", &tuning).unwrap();

        let after = registry.breaker("heating").config();
        assert_eq!(after.failure_threshold, 8);
        assert_eq!(after.recovery_timeout, before.recovery_timeout);
        assert_eq!(after.max_retries, before.max_retries);
    }

    #[test]
    fn test_system_metrics_covers_all_circuits() {
        let registry = CircuitBreakerRegistry::new();
        registry.breaker("heating");
        registry.breaker("ventilation");
        registry.breaker("weather_provider");

        let metrics = registry.system_metrics();
        assert_eq!(metrics.circuit_breakers.len(), 3);
        assert_eq!(registry.health_score(), 1.0);
    }

    #[tokio::test]
    async fn test_metrics_reporter_handle_aborts() {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let handle = registry.spawn_metrics_reporter(Duration::from_millis(10));
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
