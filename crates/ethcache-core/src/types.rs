//! JSON-RPC 2.0 wire types used by the proxy pipeline.
//!
//! The proxy deliberately keeps its view of requests shallow: it needs the
//! `method` and `params` for the cacheability decision, and the `id` for
//! reconstructing the envelope on cache hits. Everything else is forwarded
//! byte-for-byte, so no full protocol model is required.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC 2.0 request as seen by the proxy.
///
/// All fields default when missing so that any well-formed JSON object can be
/// forwarded upstream unchanged; only the request's *shape* (a batch array,
/// or non-JSON) is rejected at parse time.
///
/// # Example
///
/// ```
/// use ethcache_core::types::JsonRpcRequest;
///
/// let request: JsonRpcRequest = serde_json::from_str(
///     r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":1}"#,
/// )
/// .unwrap();
/// assert_eq!(request.method, "eth_getTransactionByHash");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub id: serde_json::Value,
}

/// The slice of a JSON-RPC 2.0 response envelope the write-back path inspects.
///
/// `result` is kept raw: on a cacheable miss the proxy stores exactly the
/// bytes the upstream produced, without re-serialising them.
#[derive(Debug, Deserialize)]
pub struct JsonRpcEnvelope {
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
    /// `None` covers both an absent `error` field and an explicit `null`.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl JsonRpcEnvelope {
    /// Whether this envelope represents a successful call whose `result` may
    /// be cached.
    #[must_use]
    pub fn is_cacheable_success(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }
}

/// Response envelope reconstructed around a cached `result` on the hit path.
///
/// The `id` is the one supplied by the *current* caller, not whatever id was
/// in flight when the entry was written.
#[derive(Debug, Serialize)]
pub struct CachedRpcResponse<'a> {
    pub jsonrpc: &'static str,
    pub result: &'a RawValue,
    pub id: &'a serde_json::Value,
}

impl<'a> CachedRpcResponse<'a> {
    #[must_use]
    pub fn new(result: &'a RawValue, id: &'a serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, result, id }
    }
}
