//! The proxy request pipeline.
//!
//! [`RpcProxy::handle`] runs one inbound JSON-RPC request through the
//! pipeline: parse, cacheability check, cache lookup, rate-limited upstream
//! dispatch, conditional write-back, response assembly.
//!
//! Two asymmetries are load-bearing:
//!
//! - On a **hit**, the response envelope is reconstructed around the cached
//!   `result` with the *caller's* `id`. On a **miss**, the upstream body is
//!   returned byte-for-byte, echoing whatever id the upstream produced.
//! - The cache is advisory on this path: a store read failure is a miss and a
//!   store write failure is logged and swallowed. Only upstream failures fail
//!   the request.
//!
//! Client disconnects drop the handler future, which cancels any pending
//! store call, limiter wait, or upstream I/O.

use crate::cache;
use crate::cleanup::CleanupNotifier;
use crate::metrics::MetricsCollector;
use crate::ratelimit::TokenBucket;
use crate::store::CacheStore;
use crate::types::{CachedRpcResponse, JsonRpcEnvelope, JsonRpcRequest};
use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::{debug, warn};

/// The request handler shared by all inbound connections.
///
/// Holds the process-wide upstream HTTP client, the store handle, and the
/// optional rate limiter and cleanup notifier. Per-request state never
/// escapes [`RpcProxy::handle`].
pub struct RpcProxy {
    upstream_url: String,
    http_client: reqwest::Client,
    store: Arc<dyn CacheStore>,
    limiter: Option<TokenBucket>,
    cleanup: Option<CleanupNotifier>,
    metrics: Arc<MetricsCollector>,
}

impl RpcProxy {
    #[must_use]
    pub fn new(
        upstream_url: impl Into<String>,
        store: Arc<dyn CacheStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            http_client: reqwest::Client::new(),
            store,
            limiter: None,
            cleanup: None,
            metrics,
        }
    }

    /// Gates upstream dispatch at `requests_per_second` (burst `⌊r⌋ + 1`).
    /// Non-positive rates leave the limiter disabled.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: f64) -> Self {
        if requests_per_second > 0.0 {
            self.limiter = Some(TokenBucket::new(requests_per_second));
        }
        self
    }

    /// Wires the eviction worker's write-notification handle into the
    /// write-back path.
    #[must_use]
    pub fn with_cleanup_notifier(mut self, notifier: CleanupNotifier) -> Self {
        self.cleanup = Some(notifier);
        self
    }

    /// Processes a single JSON-RPC request body.
    pub async fn handle(&self, body: Bytes) -> Response {
        let request: JsonRpcRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejecting malformed request body");
                return (StatusCode::BAD_REQUEST, "invalid json").into_response();
            }
        };

        // The key doubles as the write-back decision: it stays None for
        // uncacheable methods and derivation failures.
        let mut cache_key = None;
        if cache::is_cacheable(&request.method, request.params.as_ref()) {
            match cache::derive_cache_key(&request.method, request.params.as_ref()) {
                Ok(key) => {
                    if let Some(response) = self.try_serve_from_cache(&key, &request).await {
                        return response;
                    }
                    self.metrics.record_cache_miss(&request.method);
                    cache_key = Some(key);
                }
                Err(e) => {
                    debug!(method = %request.method, error = %e, "cache key derivation failed");
                }
            }
        }

        if let Some(limiter) = &self.limiter {
            if let Err(e) = limiter.acquire().await {
                debug!(method = %request.method, error = %e, "upstream rate limit exceeded");
                return (StatusCode::TOO_MANY_REQUESTS, "upstream rate limit exceeded")
                    .into_response();
            }
        }

        // Forward the original body byte-identical; only the content type is
        // ours.
        let upstream_response = match self
            .http_client
            .post(&self.upstream_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(method = %request.method, error = %e, "upstream request failed");
                return (StatusCode::BAD_GATEWAY, "upstream error").into_response();
            }
        };

        let upstream_body = match upstream_response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(method = %request.method, error = %e, "failed to read upstream response");
                return (StatusCode::INTERNAL_SERVER_ERROR, "failed to read upstream response")
                    .into_response();
            }
        };

        if let Some(key) = cache_key {
            self.write_back(&key, &request.method, &upstream_body).await;
        }

        ([(header::CONTENT_TYPE, "application/json")], upstream_body).into_response()
    }

    /// Cache lookup. Returns the assembled hit response, or `None` on a miss
    /// or on any store/decoding failure.
    async fn try_serve_from_cache(&self, key: &str, request: &JsonRpcRequest) -> Option<Response> {
        let cached = match self.store.get_and_touch(key).await {
            Ok(cached) => cached?,
            Err(e) => {
                warn!(method = %request.method, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        // A row that no longer parses is overwritten by the write-back of
        // the miss we are about to take.
        let result: Box<RawValue> = match serde_json::from_slice(&cached) {
            Ok(result) => result,
            Err(e) => {
                warn!(method = %request.method, error = %e, "cached result unparseable, treating as miss");
                return None;
            }
        };

        let body = match serde_json::to_vec(&CachedRpcResponse::new(&result, &request.id)) {
            Ok(body) => body,
            Err(e) => {
                warn!(method = %request.method, error = %e, "failed to assemble cached response");
                return None;
            }
        };

        self.metrics.record_cache_hit(&request.method);
        Some(([(header::CONTENT_TYPE, "application/json")], body).into_response())
    }

    /// Stores the raw `result` of an error-free upstream envelope, then
    /// signals the eviction worker. Failures never propagate to the client.
    async fn write_back(&self, key: &str, method: &str, upstream_body: &[u8]) {
        let Ok(envelope) = serde_json::from_slice::<JsonRpcEnvelope>(upstream_body) else {
            debug!(method, "upstream body is not a JSON-RPC envelope, skipping write-back");
            return;
        };
        if !envelope.is_cacheable_success() {
            return;
        }
        let Some(result) = envelope.result else { return };

        match self.store.put(key, method, result.get().as_bytes()).await {
            Ok(()) => {
                if let Some(cleanup) = &self.cleanup {
                    cleanup.notify();
                }
            }
            Err(e) => warn!(method, error = %e, "cache write failed"),
        }
    }
}
