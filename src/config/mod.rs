//! # Configuration
//!
//! Typed configuration for the caching and resilience core. Every knob has
//! a production-safe default, so `CoreConfig::default()` is fully usable;
//! `CoreConfig::from_env()` layers `EQUIPMENT_CORE__*` environment overrides
//! on top (double underscore separates nesting levels, e.g.
//! `EQUIPMENT_CORE__CACHE__MAX_ENTRIES=500`).

use crate::resilience::CircuitBreakerConfig;
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Environment source failed to load or deserialize
    #[error("Failed to load configuration from environment: {error}")]
    EnvironmentLoad { error: String },

    /// A field holds a value outside its valid range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Cache capacity and lifetime settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Byte budget across all entries (estimated, not exact)
    pub max_total_bytes: usize,

    /// Entry-count budget
    pub max_entries: usize,

    /// TTL applied when a write does not specify one
    pub default_ttl_secs: u64,

    /// Period of the background expired-entry sweep
    pub cleanup_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_total_bytes: 50 * 1024 * 1024,
            max_entries: 1000,
            default_ttl_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_entries == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "cache.max_entries".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_total_bytes == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "cache.max_total_bytes".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.default_ttl_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "cache.default_ttl_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Partial per-circuit override; unset fields keep the preset's value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CircuitTuning {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: Option<u64>,
    pub half_open_max_calls: Option<u32>,
    pub call_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub max_retry_delay_secs: Option<u64>,
    pub use_exponential_backoff: Option<bool>,
}

impl CircuitTuning {
    /// Apply this tuning on top of a preset
    pub fn apply_to(&self, mut config: CircuitBreakerConfig) -> CircuitBreakerConfig {
        if let Some(value) = self.failure_threshold {
            config.failure_threshold = value;
        }
        if let Some(value) = self.recovery_timeout_secs {
            config.recovery_timeout = Duration::from_secs(value);
        }
        if let Some(value) = self.half_open_max_calls {
            config.half_open_max_calls = value;
        }
        if let Some(value) = self.call_timeout_secs {
            config.call_timeout = Duration::from_secs(value);
        }
        if let Some(value) = self.max_retries {
            config.max_retries = value;
        }
        if let Some(value) = self.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(value);
        }
        if let Some(value) = self.max_retry_delay_secs {
            config.max_retry_delay = Duration::from_secs(value);
        }
        if let Some(value) = self.use_exponential_backoff {
            config.use_exponential_backoff = value;
        }
        config
    }
}

/// Circuit breaker fleet settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    /// Period of the background metrics sweep
    pub metrics_interval_secs: u64,

    /// Per-circuit tuning, keyed by circuit name
    pub overrides: HashMap<String, CircuitTuning>,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 60,
            overrides: HashMap::new(),
        }
    }
}

impl CircuitSettings {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

/// Performance tracking settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Per-endpoint bounded sample window
    pub max_samples_per_endpoint: usize,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_samples_per_endpoint: 200,
        }
    }
}

/// Root configuration for the caching and resilience core
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub cache: CacheSettings,
    pub circuits: CircuitSettings,
    pub performance: PerformanceSettings,
}

impl CoreConfig {
    /// Load defaults with `EQUIPMENT_CORE__*` environment overrides applied
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let loaded = Config::builder()
            .add_source(
                Environment::with_prefix("EQUIPMENT_CORE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::EnvironmentLoad {
                error: e.to_string(),
            })?;

        let config: Self =
            loaded
                .try_deserialize()
                .map_err(|e| ConfigurationError::EnvironmentLoad {
                    error: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.cache.validate()?;

        for (name, tuning) in &self.circuits.overrides {
            let config = tuning.apply_to(CircuitBreakerConfig::for_circuit_name(name));
            config
                .validate()
                .map_err(|reason| ConfigurationError::InvalidValue {
                    field: format!("circuits.overrides.{name}"),
                    reason,
                })?;
        }

        if self.performance.max_samples_per_endpoint == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "performance.max_samples_per_endpoint".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Fully-resolved per-circuit configurations (preset plus tuning),
    /// ready to pre-register in the circuit breaker registry
    pub fn circuit_overrides(&self) -> Vec<(String, CircuitBreakerConfig)> {
        self.circuits
            .overrides
            .iter()
            .map(|(name, tuning)| {
                (
                    name.clone(),
                    tuning.apply_to(CircuitBreakerConfig::for_circuit_name(name)),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_max_entries_rejected() {
        let mut config = CoreConfig::default();
        config.cache.max_entries = 0;

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("cache.max_entries"));
    }

    #[test]
    fn test_tuning_overrides_only_set_fields() {
        let tuning = CircuitTuning {
            failure_threshold: Some(9),
            ..Default::default()
        };

        let preset = CircuitBreakerConfig::for_circuit_name("air_conditioning");
        let resolved = tuning.apply_to(preset.clone());

        assert_eq!(resolved.failure_threshold, 9);
        assert_eq!(resolved.recovery_timeout, preset.recovery_timeout);
    }

    #[test]
    fn test_invalid_override_rejected_at_validation() {
        let mut config = CoreConfig::default();
        config.circuits.overrides.insert(
            "heating".to_string(),
            CircuitTuning {
                failure_threshold: Some(0),
                ..Default::default()
            },
        );

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_circuit_overrides_resolve_from_presets() {
        let mut config = CoreConfig::default();
        config.circuits.overrides.insert(
            "ventilation".to_string(),
            CircuitTuning {
                max_retries: Some(5),
                ..Default::default()
            },
        );

        let resolved = config.circuit_overrides();
        assert_eq!(resolved.len(), 1);
        let (name, breaker_config) = &resolved[0];
        assert_eq!(name, "ventilation");
        assert_eq!(breaker_config.max_retries, 5);
        // Untouched fields come from the ventilation preset
        assert_eq!(breaker_config.failure_threshold, 4);
    }
}
