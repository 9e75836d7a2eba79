//! End-to-end tests for the executor, circuit breakers, and cache working
//! together against a stubbed transport.

use async_trait::async_trait;
use equipment_core::{
    CacheSettings, CacheWriteOptions, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    ExecutorError, ExecutorResult, Fallback, HttpMethod, ResilientExecutor, Transport,
    TransportRequest, TransportResponse,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Air-conditioning style circuit scaled to millisecond timings so the
/// full open/recover cycle runs inside a test
fn ac_style_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_timeout: Duration::from_millis(60),
        half_open_max_calls: 2,
        call_timeout: Duration::from_millis(200),
        max_retries: 0,
        retry_base_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(10),
        use_exponential_backoff: true,
    }
}

fn executor_with(name: &str, config: CircuitBreakerConfig) -> ResilientExecutor {
    let registry = Arc::new(CircuitBreakerRegistry::with_overrides([(
        name.to_string(),
        config,
    )]));
    let cache = Arc::new(equipment_core::CacheStore::new(CacheSettings::default()));
    ResilientExecutor::new(registry, cache)
}

struct FlakyTransport {
    healthy: AtomicBool,
    calls: AtomicU32,
}

impl FlakyTransport {
    fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn perform(&self, request: TransportRequest) -> ExecutorResult<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(TransportResponse::new(200, json!({"url": request.url})))
        } else {
            Ok(TransportResponse::new(503, json!({"message": "backend down"})))
        }
    }
}

#[tokio::test]
async fn test_circuit_opens_after_threshold_and_recovers_via_probe() {
    let executor = executor_with("air_conditioning", ac_style_config());
    let transport = FlakyTransport::new(false);
    let request = TransportRequest::new(
        HttpMethod::Post,
        "/api/ac/target",
        Duration::from_millis(100),
    );

    // Three consecutive failures trip the circuit
    for _ in 0..3 {
        let result = executor
            .execute_request(
                "air_conditioning",
                &transport,
                request.clone(),
                CacheWriteOptions::default(),
                Fallback::none(),
            )
            .await;
        assert!(matches!(result, Err(ExecutorError::Server { .. })));
    }
    let breaker = executor.registry().breaker("air_conditioning");
    assert_eq!(breaker.state(), CircuitState::Open);

    // While open, calls are refused without touching the transport
    let calls_before = transport.calls.load(Ordering::SeqCst);
    let result = executor
        .execute_request(
            "air_conditioning",
            &transport,
            request.clone(),
            CacheWriteOptions::default(),
            Fallback::none(),
        )
        .await;
    assert!(matches!(result, Err(ExecutorError::CircuitOpen { .. })));
    assert_eq!(transport.calls.load(Ordering::SeqCst), calls_before);

    // After the recovery timeout, a probe is admitted; the backend has
    // recovered, so the single success closes the circuit again
    tokio::time::sleep(Duration::from_millis(80)).await;
    transport.healthy.store(true, Ordering::SeqCst);

    let result = executor
        .execute_request(
            "air_conditioning",
            &transport,
            request,
            CacheWriteOptions::default(),
            Fallback::none(),
        )
        .await;
    assert!(result.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_open_circuit_redirects_to_fallback_value() {
    let executor = executor_with("ventilation", ac_style_config());
    let breaker = executor.registry().breaker("ventilation");
    for _ in 0..3 {
        breaker.record_failure(Duration::from_millis(1));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let invoked = AtomicU32::new(0);
    let result = executor
        .execute_with_fallback(
            "ventilation",
            || async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(json!("primary"))
            },
            Fallback::value(json!("stale snapshot")),
        )
        .await;

    assert_eq!(result.unwrap(), json!("stale snapshot"));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cached_read_served_even_while_circuit_is_open() {
    let executor = executor_with("weather", ac_style_config());
    let transport = FlakyTransport::new(true);
    let request = TransportRequest::get("/api/weather/today", Duration::from_millis(100));

    // Warm the cache through a healthy backend
    executor
        .execute_request(
            "weather",
            &transport,
            request.clone(),
            CacheWriteOptions::default().with_tag("weather"),
            Fallback::none(),
        )
        .await
        .unwrap();

    // The backend degrades and the circuit trips
    let breaker = executor.registry().breaker("weather");
    for _ in 0..3 {
        breaker.record_failure(Duration::from_millis(1));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // The cached read short-circuits admission entirely
    let calls_before = transport.calls.load(Ordering::SeqCst);
    let result = executor
        .execute_request(
            "weather",
            &transport,
            request.clone(),
            CacheWriteOptions::default(),
            Fallback::none(),
        )
        .await;
    assert!(result.is_ok());
    assert_eq!(transport.calls.load(Ordering::SeqCst), calls_before);

    // Invalidating the tag removes the shield; the next read is refused
    assert_eq!(executor.cache().invalidate_by_tag("weather"), 1);
    let result = executor
        .execute_request(
            "weather",
            &transport,
            request,
            CacheWriteOptions::default(),
            Fallback::none(),
        )
        .await;
    assert!(matches!(result, Err(ExecutorError::CircuitOpen { .. })));
}

#[tokio::test]
async fn test_client_error_surfaces_immediately_through_full_stack() {
    struct RejectingTransport;

    #[async_trait]
    impl Transport for RejectingTransport {
        async fn perform(&self, _request: TransportRequest) -> ExecutorResult<TransportResponse> {
            Ok(TransportResponse::new(
                422,
                json!({"message": "invalid target temperature"}),
            ))
        }
    }

    let mut config = ac_style_config();
    config.max_retries = 3;
    let executor = executor_with("heating", config);

    let result = executor
        .execute_request(
            "heating",
            &RejectingTransport,
            TransportRequest::new(HttpMethod::Put, "/api/heating/zone/1", Duration::from_millis(100)),
            CacheWriteOptions::default(),
            Fallback::none(),
        )
        .await;

    match result {
        Err(ExecutorError::Client { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "invalid target temperature");
        }
        other => panic!("expected client error, got {other:?}"),
    }

    // One deterministic rejection, one recorded failure, no retries
    let metrics = executor.registry().metrics("heating").unwrap();
    assert_eq!(metrics.total_calls, 1);
}

#[tokio::test]
async fn test_retries_exhausted_then_fallback_chain_in_order() {
    let mut config = ac_style_config();
    config.max_retries = 2;
    config.failure_threshold = 10;
    let executor = executor_with("field_device", config);

    let primary_calls = AtomicU32::new(0);
    let fallback_calls = Arc::new(AtomicU32::new(0));

    let result = executor
        .execute_with_fallback(
            "field_device",
            || async {
                primary_calls.fetch_add(1, Ordering::SeqCst);
                Err::<Value, _>(ExecutorError::network("device asleep"))
            },
            Fallback::function({
                let fallback_calls = Arc::clone(&fallback_calls);
                move || {
                    fallback_calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ExecutorError::network("gateway also down")) }
                }
            })
            .or_value(json!({"status": "last known"})),
        )
        .await;

    assert_eq!(result.unwrap(), json!({"status": "last known"}));
    assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_performance_samples_flow_through_cached_reads() {
    let executor = executor_with("weather", ac_style_config());
    let transport = FlakyTransport::new(true);
    let request = TransportRequest::get("/api/weather/forecast", Duration::from_millis(100));

    for _ in 0..3 {
        executor
            .execute_request(
                "weather",
                &transport,
                request.clone(),
                CacheWriteOptions::default(),
                Fallback::none(),
            )
            .await
            .unwrap();
    }

    let summary = executor
        .tracker()
        .summary("GET:/api/weather/forecast")
        .unwrap();
    assert_eq!(summary.sample_count, 3);
    // First call misses, the next two are hits
    assert!((summary.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}
