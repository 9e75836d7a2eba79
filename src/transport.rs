//! # Transport Abstraction
//!
//! The single outbound boundary of the core: an abstract `perform` operation
//! that takes a method, URL, headers, body and timeout, and yields a response
//! or an error. The core is agnostic to the concrete HTTP client behind it;
//! callers plug in their own implementation (and tests plug in stubs).

use crate::errors::{ExecutorError, ExecutorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Logical HTTP method for a backend endpoint call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Only idempotent reads are eligible for the executor's cached path
    pub fn is_idempotent_read(&self) -> bool {
        matches!(self, Self::Get)
    }
}

/// A single outbound request handed to the transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(HttpMethod::Get, url, timeout)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Cache key for the idempotent-read path
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.method.as_str(), self.url)
    }
}

/// Response produced by the transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map the response into the executor error taxonomy.
    ///
    /// 4xx statuses become `Client` errors (never retried), 5xx statuses
    /// become `Server` errors (retried), anything else is treated as a
    /// transport-level anomaly.
    pub fn into_result(self) -> ExecutorResult<Value> {
        match self.status {
            200..=299 => Ok(self.body),
            400..=499 => Err(ExecutorError::Client {
                status: self.status,
                message: body_message(&self.body),
            }),
            500..=599 => Err(ExecutorError::Server {
                status: self.status,
                message: body_message(&self.body),
            }),
            other => Err(ExecutorError::Network {
                message: format!("unexpected status {other}"),
            }),
        }
    }
}

fn body_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Abstract downstream transport performing a single network attempt
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt of the underlying call.
    ///
    /// Implementations should honor `request.timeout` as a hard bound on the
    /// network round-trip; the executor additionally races the whole attempt
    /// against the circuit's call timeout.
    async fn perform(&self, request: TransportRequest) -> ExecutorResult<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_status_yields_body() {
        let response = TransportResponse::new(200, json!({"temperature": 21.5}));
        assert!(response.is_success());
        assert_eq!(response.into_result().unwrap(), json!({"temperature": 21.5}));
    }

    #[test]
    fn test_client_status_maps_to_client_error() {
        let response = TransportResponse::new(404, json!({"message": "unit not found"}));
        match response.into_result() {
            Err(ExecutorError::Client { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "unit not found");
            }
            other => panic!("expected client error, got {other:?}"),
        }
    }

    #[test]
    fn test_server_status_maps_to_server_error() {
        let response = TransportResponse::new(503, json!({}));
        assert!(matches!(
            response.into_result(),
            Err(ExecutorError::Server { status: 503, .. })
        ));
    }

    #[test]
    fn test_cache_key_includes_method_and_url() {
        let request = TransportRequest::get("/api/heating/zones", Duration::from_secs(5));
        assert_eq!(request.cache_key(), "GET:/api/heating/zones");
    }

    #[test]
    fn test_only_get_is_idempotent_read() {
        assert!(HttpMethod::Get.is_idempotent_read());
        assert!(!HttpMethod::Post.is_idempotent_read());
        assert!(!HttpMethod::Delete.is_idempotent_read());
    }
}
