//! # Resilient Request Executor
//!
//! Orchestrates a single logical call against a backend dependency:
//! cache lookup, circuit-breaker admission, timed attempt with
//! retry/backoff, cache population, fallback on exhaustion.
//!
//! Propagation policy: client-class errors bypass retry entirely, circuit
//! refusals never consume a retry budget, and every failure is reported
//! exactly once to the event sink: retried attempts as they happen and the
//! terminal outcome before fallback substitution.

use crate::cache::{CacheStore, CacheWriteOptions};
use crate::config::CoreConfig;
use crate::errors::{ExecutorError, ExecutorResult};
use crate::executor::backoff::RetryPolicy;
use crate::resilience::CircuitBreakerRegistry;
use crate::telemetry::{EventSink, PerformanceSample, PerformanceTracker, TracingEventSink};
use crate::transport::{Transport, TransportRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type FallbackFn<T> = Box<dyn Fn() -> BoxFuture<'static, ExecutorResult<T>> + Send + Sync>;

/// Substitute used when the primary call path is exhausted or the circuit
/// refuses admission.
///
/// Resolution order: the fallback function first; if it fails or is absent,
/// the static value; if neither yields a value, the caller sees a terminal
/// error.
pub struct Fallback<T> {
    function: Option<FallbackFn<T>>,
    value: Option<T>,
}

impl<T> Fallback<T> {
    /// No fallback: terminal errors propagate to the caller
    pub fn none() -> Self {
        Self {
            function: None,
            value: None,
        }
    }

    /// Static fallback value
    pub fn value(value: T) -> Self {
        Self {
            function: None,
            value: Some(value),
        }
    }

    /// Alternate async operation tried before any static value
    pub fn function<F, Fut>(function: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExecutorResult<T>> + Send + 'static,
    {
        Self {
            function: Some(Box::new(move || function().boxed())),
            value: None,
        }
    }

    /// Add a static value tried after the fallback function fails
    pub fn or_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }
}

impl<T> Default for Fallback<T> {
    fn default() -> Self {
        Self::none()
    }
}

/// Executor tying together the circuit breaker registry, the response
/// cache, and the retry/backoff schedule.
///
/// Cheap to clone; all state lives behind `Arc`s, so clones share the same
/// circuits, cache, and performance samples.
///
/// # Example
///
/// ```rust
/// use equipment_core::{CoreConfig, ExecutorError, ResilientExecutor};
///
/// # tokio_test::block_on(async {
/// let executor = ResilientExecutor::from_config(&CoreConfig::default());
/// let reading = executor
///     .execute("heating", || async { Ok::<_, ExecutorError>(21.5) })
///     .await
///     .unwrap();
/// assert_eq!(reading, 21.5);
/// # });
/// ```
#[derive(Clone)]
pub struct ResilientExecutor {
    registry: Arc<CircuitBreakerRegistry>,
    cache: Arc<CacheStore>,
    tracker: Arc<PerformanceTracker>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("circuits", &self.registry.circuit_names())
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}

impl ResilientExecutor {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, cache: Arc<CacheStore>) -> Self {
        Self {
            registry,
            cache,
            tracker: Arc::new(PerformanceTracker::default()),
            sink: Arc::new(TracingEventSink),
        }
    }

    /// Build registry, cache, and tracker from a resolved configuration
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            registry: Arc::new(CircuitBreakerRegistry::with_overrides(
                config.circuit_overrides(),
            )),
            cache: Arc::new(CacheStore::new(config.cache.clone())),
            tracker: Arc::new(PerformanceTracker::new(
                config.performance.max_samples_per_endpoint,
            )),
            sink: Arc::new(TracingEventSink),
        }
    }

    /// Substitute the observability sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Execute an operation under the named circuit with retry and backoff.
    ///
    /// Terminal errors propagate to the caller; use
    /// [`ResilientExecutor::execute_with_fallback`] to substitute a value
    /// instead.
    pub async fn execute<T, F, Fut>(&self, circuit_name: &str, operation: F) -> ExecutorResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ExecutorResult<T>>,
    {
        self.execute_attempts(circuit_name, operation).await.0
    }

    /// Execute with a fallback chain resolved on any terminal error
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        circuit_name: &str,
        operation: F,
        fallback: Fallback<T>,
    ) -> ExecutorResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ExecutorResult<T>>,
    {
        match self.execute_attempts(circuit_name, operation).await.0 {
            Ok(value) => Ok(value),
            Err(error) => self.resolve_fallback(circuit_name, fallback, error).await,
        }
    }

    /// Execute a cacheable read: a fresh cached value short-circuits the
    /// whole call path and is reported as a zero-retry success. A miss runs
    /// the full algorithm and populates the cache on success.
    pub async fn execute_cached<F, Fut>(
        &self,
        circuit_name: &str,
        cache_key: &str,
        options: CacheWriteOptions,
        operation: F,
    ) -> ExecutorResult<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ExecutorResult<Value>>,
    {
        let started = Instant::now();

        if let Some(value) = self.cache.get(cache_key) {
            debug!(circuit = circuit_name, cache_key = cache_key, "Cache HIT");
            self.tracker.record(PerformanceSample {
                endpoint_key: cache_key.to_string(),
                latency: started.elapsed(),
                cache_hit: true,
                retry_count: 0,
            });
            return Ok(value);
        }

        let (result, attempts) = self.execute_attempts(circuit_name, operation).await;

        if let Ok(value) = &result {
            self.cache.set(cache_key, value.clone(), options);
        }

        self.tracker.record(PerformanceSample {
            endpoint_key: cache_key.to_string(),
            latency: started.elapsed(),
            cache_hit: false,
            retry_count: attempts.saturating_sub(1),
        });

        result
    }

    /// Execute a transport request under the named circuit.
    ///
    /// Idempotent reads go through the cached path keyed by method and URL;
    /// all other methods always hit the transport. The fallback chain is
    /// resolved on any terminal error.
    pub async fn execute_request(
        &self,
        circuit_name: &str,
        transport: &dyn Transport,
        request: TransportRequest,
        options: CacheWriteOptions,
        fallback: Fallback<Value>,
    ) -> ExecutorResult<Value> {
        let operation = || {
            let request = request.clone();
            async move { transport.perform(request).await?.into_result() }
        };

        let result = if request.method.is_idempotent_read() {
            self.execute_cached(circuit_name, &request.cache_key(), options, operation)
                .await
        } else {
            let started = Instant::now();
            let endpoint_key = request.cache_key();
            let (result, attempts) = self.execute_attempts(circuit_name, operation).await;
            self.tracker.record(PerformanceSample {
                endpoint_key,
                latency: started.elapsed(),
                cache_hit: false,
                retry_count: attempts.saturating_sub(1),
            });
            result
        };

        match result {
            Ok(value) => Ok(value),
            Err(error) => self.resolve_fallback(circuit_name, fallback, error).await,
        }
    }

    /// Core retry loop. Returns the terminal result and the number of
    /// attempts actually performed (0 when the circuit refused admission).
    async fn execute_attempts<T, F, Fut>(
        &self,
        circuit_name: &str,
        operation: F,
    ) -> (ExecutorResult<T>, u32)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ExecutorResult<T>>,
    {
        let breaker = self.registry.breaker(circuit_name);
        let config = breaker.config();
        let policy = RetryPolicy::from_config(&config);
        let started = Instant::now();

        let mut attempts: u32 = 0;
        let mut last_error: Option<ExecutorError> = None;

        for attempt in 0..=config.max_retries {
            if !breaker.try_acquire() {
                // Refusals consume no retry budget; the call fails fast.
                // CircuitOpen is synthetic and only used when no attempt was
                // made; after a mid-loop trip the real error propagates.
                let error = last_error.take().unwrap_or(ExecutorError::CircuitOpen {
                    circuit: circuit_name.to_string(),
                });
                self.sink
                    .call_failed(circuit_name, attempts, started.elapsed(), &error);
                return (Err(error), attempts);
            }

            attempts += 1;
            let attempt_started = Instant::now();

            let outcome = match tokio::time::timeout(config.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ExecutorError::Timeout {
                    timeout: config.call_timeout,
                }),
            };

            match outcome {
                Ok(value) => {
                    breaker.record_success(attempt_started.elapsed());
                    self.sink
                        .call_succeeded(circuit_name, attempts, started.elapsed());
                    return (Ok(value), attempts);
                }
                Err(error) => {
                    breaker.record_failure(attempt_started.elapsed());

                    if !error.is_retryable() || attempt == config.max_retries {
                        last_error = Some(error);
                        break;
                    }

                    // Non-terminal failure: reported here, the terminal
                    // outcome is reported separately below
                    self.sink.attempt_failed(circuit_name, attempts, &error);
                    last_error = Some(error);

                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        circuit = circuit_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // max_retries = 0 still performs one attempt, so an error exists here
        let error = last_error.unwrap_or(ExecutorError::CircuitOpen {
            circuit: circuit_name.to_string(),
        });
        self.sink
            .call_failed(circuit_name, attempts, started.elapsed(), &error);
        (Err(error), attempts)
    }

    /// Resolve the fallback chain for a terminal error: function first,
    /// then static value, otherwise surface the failure
    async fn resolve_fallback<T>(
        &self,
        circuit_name: &str,
        fallback: Fallback<T>,
        error: ExecutorError,
    ) -> ExecutorResult<T> {
        let Fallback { function, value } = fallback;
        let had_function = function.is_some();

        if let Some(function) = function {
            match function().await {
                Ok(substituted) => {
                    info!(
                        circuit = circuit_name,
                        error_category = error.category(),
                        "Fallback function substituted a value"
                    );
                    return Ok(substituted);
                }
                Err(fallback_error) => {
                    warn!(
                        circuit = circuit_name,
                        error = %fallback_error,
                        "Fallback function failed"
                    );
                }
            }
        }

        if let Some(substituted) = value {
            info!(
                circuit = circuit_name,
                error_category = error.category(),
                "Static fallback value substituted"
            );
            return Ok(substituted);
        }

        if had_function {
            return Err(ExecutorError::FallbackExhausted {
                circuit: circuit_name.to_string(),
                message: error.to_string(),
            });
        }

        Err(error)
    }
}
