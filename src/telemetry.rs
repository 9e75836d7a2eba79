//! # Telemetry
//!
//! Performance sampling and the observability sink boundary.
//!
//! The executor appends one [`PerformanceSample`] per endpoint-keyed call
//! (the cached-read path and every transport request, reads and writes
//! alike) to a bounded rolling buffer per endpoint, dropping the oldest
//! samples past the cap. Bare closures run through `execute` carry no
//! endpoint key and are visible only through the [`EventSink`], which
//! receives every terminal outcome exactly once and every retried attempt
//! failure once each. The default sink emits structured tracing events;
//! production deployments can substitute their own exporter.

use crate::errors::ExecutorError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{info, warn};

/// One observed logical call against an endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    /// Logical endpoint the call targeted (cache key or circuit name)
    pub endpoint_key: String,

    /// End-to-end latency of the logical call
    pub latency: Duration,

    /// Whether the call was served from cache (zero-latency short-circuit)
    pub cache_hit: bool,

    /// Number of retries consumed (0 = first attempt succeeded)
    pub retry_count: u32,
}

/// Aggregated view over the retained samples for one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub endpoint_key: String,
    pub sample_count: usize,
    pub average_latency: Duration,
    pub cache_hit_rate: f64,
    pub average_retries: f64,
}

/// Bounded rolling buffers of performance samples, one per endpoint
#[derive(Debug)]
pub struct PerformanceTracker {
    max_samples_per_endpoint: usize,
    samples: Mutex<HashMap<String, VecDeque<PerformanceSample>>>,
}

impl PerformanceTracker {
    pub fn new(max_samples_per_endpoint: usize) -> Self {
        Self {
            max_samples_per_endpoint: max_samples_per_endpoint.max(1),
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Append a sample, dropping the oldest once the per-endpoint cap is hit
    pub fn record(&self, sample: PerformanceSample) {
        let mut samples = self.samples.lock();
        let buffer = samples.entry(sample.endpoint_key.clone()).or_default();
        buffer.push_back(sample);
        while buffer.len() > self.max_samples_per_endpoint {
            buffer.pop_front();
        }
    }

    /// Aggregate the retained samples for one endpoint
    pub fn summary(&self, endpoint_key: &str) -> Option<EndpointSummary> {
        let samples = self.samples.lock();
        let buffer = samples.get(endpoint_key)?;
        if buffer.is_empty() {
            return None;
        }

        let count = buffer.len();
        let total_latency: Duration = buffer.iter().map(|s| s.latency).sum();
        let hits = buffer.iter().filter(|s| s.cache_hit).count();
        let total_retries: u64 = buffer.iter().map(|s| u64::from(s.retry_count)).sum();

        Some(EndpointSummary {
            endpoint_key: endpoint_key.to_string(),
            sample_count: count,
            average_latency: total_latency / count as u32,
            cache_hit_rate: hits as f64 / count as f64,
            average_retries: total_retries as f64 / count as f64,
        })
    }

    /// All endpoints with at least one retained sample
    pub fn endpoints(&self) -> Vec<String> {
        self.samples.lock().keys().cloned().collect()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Observability sink for call outcomes.
///
/// Each failure is reported exactly once: intermediate failures that will
/// be retried arrive via [`EventSink::attempt_failed`], and the terminal
/// outcome of the logical call arrives via [`EventSink::call_succeeded`]
/// or [`EventSink::call_failed`] (the latter carries the final attempt's
/// error, before any fallback substitution).
pub trait EventSink: Send + Sync {
    /// A logical call completed successfully after `attempts` attempts
    fn call_succeeded(&self, circuit: &str, attempts: u32, elapsed: Duration);

    /// A logical call failed terminally (before any fallback substitution)
    fn call_failed(&self, circuit: &str, attempts: u32, elapsed: Duration, error: &ExecutorError);

    /// Attempt number `attempt` failed and a retry will follow.
    ///
    /// Default is a no-op for sinks that only care about terminal outcomes.
    fn attempt_failed(&self, circuit: &str, attempt: u32, error: &ExecutorError) {
        let _ = (circuit, attempt, error);
    }
}

/// Default sink emitting structured tracing events
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn call_succeeded(&self, circuit: &str, attempts: u32, elapsed: Duration) {
        info!(
            circuit = circuit,
            attempts = attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "Call succeeded"
        );
    }

    fn call_failed(&self, circuit: &str, attempts: u32, elapsed: Duration, error: &ExecutorError) {
        warn!(
            circuit = circuit,
            attempts = attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            error_category = error.category(),
            error = %error,
            "Call failed"
        );
    }

    fn attempt_failed(&self, circuit: &str, attempt: u32, error: &ExecutorError) {
        warn!(
            circuit = circuit,
            attempt = attempt,
            error_category = error.category(),
            error = %error,
            "Attempt failed, retry scheduled"
        );
    }
}
