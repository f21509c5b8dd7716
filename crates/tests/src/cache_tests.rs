//! End-to-end cache behavior through the real router and pipeline.

use crate::mock_infrastructure::{MockUpstream, TestProxy, TestProxyOptions};
use axum::http::StatusCode;
use ethcache_core::cache::derive_cache_key;
use serde_json::{json, Value};

async fn default_proxy() -> TestProxy {
    TestProxy::start(MockUpstream::start_with_fixtures().await, TestProxyOptions::default()).await
}

#[tokio::test]
async fn test_transaction_by_hash_is_cached() {
    let proxy = default_proxy().await;
    let request = r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":1}"#;

    let (status, body) = proxy.post_rpc(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proxy.upstream.hits(), 1);

    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        parsed["result"]["hash"],
        "0x0000000000000000000000000000000000000000000000000000000000000123"
    );

    let (status, _) = proxy.post_rpc(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proxy.upstream.hits(), 1, "second dispatch must be served from cache");
}

#[tokio::test]
async fn test_each_cacheable_method_reaches_upstream_once() {
    let proxy = default_proxy().await;

    let requests = [
        r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":1}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getTransactionReceipt","params":["0x123"],"id":2}"#,
        r#"{"jsonrpc":"2.0","method":"debug_traceTransaction","params":["0x123"],"id":3}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0","0x64"],"id":4}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getProof","params":["0x123",[],"0x64"],"id":5}"#,
    ];

    for (index, request) in requests.iter().enumerate() {
        let expected = index as u32 + 1;

        let (status, _) = proxy.post_rpc(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(proxy.upstream.hits(), expected);

        let (status, _) = proxy.post_rpc(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(proxy.upstream.hits(), expected, "repeat of {request} must not dispatch");
    }

    assert_eq!(proxy.store.len(), requests.len());
}

#[tokio::test]
async fn test_latest_block_param_is_never_cached() {
    let proxy = default_proxy().await;

    for request in [
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0","latest"],"id":1}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0",null],"id":1}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0"],"id":1}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0","pending"],"id":1}"#,
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0","earliest"],"id":1}"#,
    ] {
        let before = proxy.upstream.hits();
        proxy.post_rpc(request).await;
        proxy.post_rpc(request).await;
        assert_eq!(proxy.upstream.hits(), before + 2, "{request} must dispatch every time");
    }

    assert!(proxy.store.is_empty());
}

#[tokio::test]
async fn test_block_pinned_storage_is_cached() {
    let proxy = default_proxy().await;
    let request =
        r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0","0x64"],"id":1}"#;

    proxy.post_rpc(request).await;
    proxy.post_rpc(request).await;
    assert_eq!(proxy.upstream.hits(), 1);
}

#[tokio::test]
async fn test_hit_envelope_carries_current_request_id() {
    let proxy = default_proxy().await;

    proxy
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":1}"#)
        .await;
    let (_, body) = proxy
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":"replay-7"}"#)
        .await;

    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["jsonrpc"], "2.0");
    assert_eq!(parsed["id"], "replay-7");
    assert!(parsed["result"].is_object());
}

#[tokio::test]
async fn test_key_canonicalisation_spans_wire_variants() {
    let proxy = default_proxy().await;

    // Same trace options, different object key order and whitespace.
    proxy
        .post_rpc(r#"{"jsonrpc":"2.0","method":"debug_traceTransaction","params":["0x9",{"tracer":"callTracer","timeout":"10s"}],"id":1}"#)
        .await;
    proxy
        .post_rpc("{ \"jsonrpc\": \"2.0\", \"method\": \"debug_traceTransaction\", \"params\": [ \"0x9\", { \"timeout\": \"10s\", \"tracer\": \"callTracer\" } ], \"id\": 2 }")
        .await;

    assert_eq!(proxy.upstream.hits(), 1);
    assert_eq!(proxy.store.len(), 1);
}

#[tokio::test]
async fn test_stored_entry_is_raw_result_not_envelope() {
    let proxy = default_proxy().await;
    let params = json!(["0x123", "0x0", "0x64"]);

    proxy
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x123","0x0","0x64"],"id":1}"#)
        .await;

    let key = derive_cache_key("eth_getStorageAt", Some(&params)).unwrap();
    let entry = proxy.store.entry(&key).expect("entry must exist under the canonical key");
    assert_eq!(entry.method, "eth_getStorageAt");
    assert_eq!(
        entry.response,
        br#""0x0000000000000000000000000000000000000000000000000000000000000001""#
    );
}

#[tokio::test]
async fn test_upstream_error_envelope_is_returned_but_not_cached() {
    let upstream = MockUpstream::start(|method, id| match method {
        "eth_getTransactionByHash" => Some(format!(
            r#"{{"jsonrpc":"2.0","id":{id},"error":{{"code":-32000,"message":"header not found"}}}}"#
        )),
        _ => None,
    })
    .await;
    let proxy = TestProxy::start(upstream, TestProxyOptions::default()).await;

    let request = r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":1}"#;

    let (status, body) = proxy.post_rpc(request).await;
    assert_eq!(status, StatusCode::OK, "application errors travel inside the envelope");
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["error"]["code"], -32000);

    proxy.post_rpc(request).await;
    assert_eq!(proxy.upstream.hits(), 2);
    assert!(proxy.store.is_empty());
}

#[tokio::test]
async fn test_store_failures_never_fail_the_request() {
    let proxy = default_proxy().await;
    let request = r#"{"jsonrpc":"2.0","method":"eth_getTransactionByHash","params":["0x123"],"id":1}"#;

    proxy.store.fail_writes.store(true, std::sync::atomic::Ordering::Relaxed);
    let (status, _) = proxy.post_rpc(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(proxy.store.is_empty());

    proxy.store.fail_writes.store(false, std::sync::atomic::Ordering::Relaxed);
    proxy.store.fail_reads.store(true, std::sync::atomic::Ordering::Relaxed);
    let (status, _) = proxy.post_rpc(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proxy.upstream.hits(), 2, "read failure falls through to upstream");
}

#[tokio::test]
async fn test_invalid_json_and_wrong_method_status_codes() {
    let proxy = default_proxy().await;

    let (status, _) = proxy.post_rpc("{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = proxy.get("/", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    assert_eq!(proxy.upstream.hits(), 0);
}

#[tokio::test]
async fn test_miss_body_is_upstream_body_verbatim() {
    let upstream = MockUpstream::start(|method, _| match method {
        // Deliberately odd formatting and an upstream-rewritten id.
        "eth_getStorageAt" => {
            Some("{ \"jsonrpc\":\"2.0\",\n\"id\": 999, \"result\": \"0x01\" }".to_string())
        }
        _ => None,
    })
    .await;
    let proxy = TestProxy::start(upstream, TestProxyOptions::default()).await;

    let (_, body) = proxy
        .post_rpc(r#"{"jsonrpc":"2.0","method":"eth_getStorageAt","params":["0x1","0x0","0x64"],"id":1}"#)
        .await;
    assert_eq!(body, b"{ \"jsonrpc\":\"2.0\",\n\"id\": 999, \"result\": \"0x01\" }");
}
