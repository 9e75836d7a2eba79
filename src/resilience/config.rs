//! # Circuit Breaker Configuration
//!
//! Per-circuit configuration with presets tuned to each equipment class's
//! expected responsiveness. Unknown circuit names fall back to the most
//! conservative default on first use.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker.
///
/// Immutable once read for a call; may be replaced wholesale between calls
/// via [`crate::resilience::CircuitBreakerRegistry::configure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time to wait after the last failure before admitting a probe
    pub recovery_timeout: Duration,

    /// Number of calls admitted while half-open before refusing further ones
    pub half_open_max_calls: u32,

    /// Hard bound on a single attempt; exceeding it counts as a failure
    pub call_timeout: Duration,

    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Base delay between retries
    pub retry_base_delay: Duration,

    /// Upper bound on any backoff delay
    pub max_retry_delay: Duration,

    /// Fixed delay when false, capped exponential with jitter when true
    pub use_exponential_backoff: bool,
}

impl CircuitBreakerConfig {
    /// Heating systems: slow actuators, tolerant thresholds
    pub fn for_heating() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 2,
            call_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(10),
            use_exponential_backoff: true,
        }
    }

    /// Air conditioning units: responsive controllers, trip early
    pub fn for_air_conditioning() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 2,
            call_timeout: Duration::from_secs(8),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(8),
            use_exponential_backoff: true,
        }
    }

    /// Ventilation systems
    pub fn for_ventilation() -> Self {
        Self {
            failure_threshold: 4,
            recovery_timeout: Duration::from_secs(45),
            half_open_max_calls: 2,
            call_timeout: Duration::from_secs(8),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(750),
            max_retry_delay: Duration::from_secs(8),
            use_exponential_backoff: true,
        }
    }

    /// Low-power field devices: long wake-up cycles, minimal retry pressure
    pub fn for_field_device() -> Self {
        Self {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(120),
            half_open_max_calls: 1,
            call_timeout: Duration::from_secs(15),
            max_retries: 1,
            retry_base_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }

    /// External weather/data providers: fast HTTP APIs, aggressive retries
    pub fn for_weather_provider() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(90),
            half_open_max_calls: 3,
            call_timeout: Duration::from_secs(5),
            max_retries: 4,
            retry_base_delay: Duration::from_millis(250),
            max_retry_delay: Duration::from_secs(5),
            use_exponential_backoff: true,
        }
    }

    /// Most conservative default, used for unknown circuit names
    pub fn most_conservative() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(120),
            half_open_max_calls: 1,
            call_timeout: Duration::from_secs(10),
            max_retries: 1,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }

    /// Resolve the preset for a circuit name.
    ///
    /// Names are matched by equipment-class prefix (case-insensitive), so
    /// instance-level circuits like `heating_building_a` inherit the class
    /// preset. Unknown names get the most conservative default.
    pub fn for_circuit_name(name: &str) -> Self {
        let normalized = name.to_ascii_lowercase();
        if normalized.starts_with("heating") {
            Self::for_heating()
        } else if normalized.starts_with("air_conditioning") {
            Self::for_air_conditioning()
        } else if normalized.starts_with("ventilation") {
            Self::for_ventilation()
        } else if normalized.starts_with("field_device") {
            Self::for_field_device()
        } else if normalized.starts_with("weather") {
            Self::for_weather_provider()
        } else {
            Self::most_conservative()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.recovery_timeout > Duration::from_secs(3600) {
            return Err("recovery_timeout should not exceed 3600 seconds".to_string());
        }

        if self.half_open_max_calls == 0 {
            return Err("half_open_max_calls must be greater than 0".to_string());
        }

        if self.call_timeout.is_zero() {
            return Err("call_timeout must be greater than 0".to_string());
        }

        if self.retry_base_delay.is_zero() {
            return Err("retry_base_delay must be greater than 0".to_string());
        }

        if self.max_retry_delay < self.retry_base_delay {
            return Err("max_retry_delay must not be smaller than retry_base_delay".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::most_conservative()
    }
}
