//! The cacheability policy: a closed set of RPC methods whose results are
//! stable enough to memoise.
//!
//! Hash-keyed lookups (`eth_getTransactionByHash`, `eth_getTransactionReceipt`,
//! `debug_traceTransaction`) are immutable once the transaction exists, so they
//! are always cacheable. State queries (`eth_getStorageAt`, `eth_getProof`) are
//! cacheable only when their block argument pins a specific block: `latest` and
//! `pending` are time-varying, and `earliest` is conventionally treated as a
//! tag as well. A missing or non-string block argument means "latest" to most
//! client libraries and is therefore uncacheable too.

use serde_json::Value;

/// The reserved block tag strings that make a state query uncacheable.
pub const BLOCK_TAGS: &[&str] = &["latest", "pending", "earliest"];

/// Returns true when a `(method, params)` pair may be cached.
///
/// The method set is closed: anything not listed here is forwarded without
/// touching the cache.
#[must_use]
pub fn is_cacheable(method: &str, params: Option<&Value>) -> bool {
    match method {
        "debug_traceTransaction" | "eth_getTransactionByHash" | "eth_getTransactionReceipt" => {
            true
        }
        // params: [address, position, blockNumber]
        "eth_getStorageAt" => has_pinned_block_param(params, 2),
        // params: [address, storageKeys, blockNumber]
        "eth_getProof" => has_pinned_block_param(params, 2),
        _ => false,
    }
}

/// Checks that `params[index]` is a concrete block quantity rather than a tag.
///
/// Missing index, non-array params, and non-string values all fail the check:
/// an omitted block argument defaults to `latest` upstream.
fn has_pinned_block_param(params: Option<&Value>, index: usize) -> bool {
    let Some(Value::Array(args)) = params else {
        return false;
    };
    let Some(Value::String(block)) = args.get(index) else {
        return false;
    };
    !BLOCK_TAGS.contains(&block.as_str())
}
