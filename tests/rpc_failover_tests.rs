//! HTTP-level tests for the resilient RPC provider.
//!
//! Uses `wiremock` endpoints to exercise failover, health windows, and
//! JSON-RPC error classification against real HTTP traffic.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nft_mint_relayer::domain::{AppError, BlockchainError};
use nft_mint_relayer::infra::retry::RetryPolicy;
use nft_mint_relayer::infra::rpc::{ResilientRpcProvider, RpcEndpoint};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10))
}

fn rpc_result(value: &str) -> serde_json::Value {
    json!({ "jsonrpc": "2.0", "id": 1, "result": value })
}

fn rpc_error(code: i64, message: &str) -> serde_json::Value {
    json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message } })
}

#[tokio::test]
async fn test_failover_reaches_last_healthy_endpoint() {
    let broken_a = MockServer::start().await;
    let broken_b = MockServer::start().await;
    let healthy = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken_a)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken_b)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result("0x10")))
        .mount(&healthy)
        .await;

    let provider = ResilientRpcProvider::new(
        "base-sepolia",
        84532,
        vec![
            RpcEndpoint::new(broken_a.uri(), 1, "broken-a"),
            RpcEndpoint::new(broken_b.uri(), 2, "broken-b"),
            RpcEndpoint::new(healthy.uri(), 3, "healthy"),
        ],
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    // Each failing endpoint absorbs its health budget before the provider
    // moves down the priority list; keep calling until traffic lands on the
    // healthy endpoint.
    let mut result = None;
    for _ in 0..5 {
        match provider.get_block_number().await {
            Ok(block) => {
                result = Some(block);
                break;
            }
            Err(e) => assert!(
                matches!(e, AppError::Blockchain(_)),
                "unexpected error: {e:?}"
            ),
        }
    }

    assert_eq!(result, Some(16));
    assert_eq!(provider.failure_count(&broken_a.uri()), 3);
    assert_eq!(provider.failure_count(&broken_b.uri()), 3);
    assert_eq!(provider.failure_count(&healthy.uri()), 0);
}

#[tokio::test]
async fn test_transport_failure_retries_within_one_call() {
    let broken = MockServer::start().await;
    let healthy = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&broken)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result("0x2a")))
        .expect(1)
        .mount(&healthy)
        .await;

    let provider = ResilientRpcProvider::new(
        "base-sepolia",
        84532,
        vec![
            RpcEndpoint::new(broken.uri(), 1, "broken"),
            RpcEndpoint::new(healthy.uri(), 2, "healthy"),
        ],
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    // One logical call: three transport failures exhaust the primary's
    // health budget and the fourth attempt lands on the fallback.
    assert_eq!(provider.get_block_number().await.unwrap(), 42);
}

#[tokio::test]
async fn test_json_rpc_business_error_does_not_fail_over() {
    let server = MockServer::start().await;
    let fallback = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(rpc_error(-32000, "nonce too low: next 7")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result("0x1")))
        .expect(0)
        .mount(&fallback)
        .await;

    let provider = ResilientRpcProvider::new(
        "base-sepolia",
        84532,
        vec![
            RpcEndpoint::new(server.uri(), 1, "primary"),
            RpcEndpoint::new(fallback.uri(), 2, "fallback"),
        ],
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    let result = provider
        .send_raw_transaction(&[0x02, 0xf8, 0x6f])
        .await;

    // NonceConflict is retryable, but always against the same healthy
    // endpoint; the fallback never sees traffic and the primary's health
    // window stays clean.
    assert!(matches!(
        result,
        Err(AppError::Blockchain(BlockchainError::NonceConflict(_)))
    ));
    assert_eq!(provider.failure_count(&server.uri()), 0);
}

#[tokio::test]
async fn test_insufficient_funds_is_fatal_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rpc_error(-32000, "insufficient funds for gas * price + value")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = ResilientRpcProvider::new(
        "base-sepolia",
        84532,
        vec![RpcEndpoint::new(server.uri(), 1, "primary")],
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    let result = provider.send_raw_transaction(&[0x01]).await;
    assert!(matches!(
        result,
        Err(AppError::Blockchain(BlockchainError::InsufficientFunds))
    ));
}

#[tokio::test]
async fn test_null_receipt_means_not_yet_seen() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": null })),
        )
        .mount(&server)
        .await;

    let provider = ResilientRpcProvider::new(
        "base-sepolia",
        84532,
        vec![RpcEndpoint::new(server.uri(), 1, "primary")],
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    let receipt = provider.get_transaction_receipt("0xabc").await.unwrap();
    assert!(receipt.is_none());
}

#[tokio::test]
async fn test_fee_estimate_doubles_base_fee() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_maxPriorityFeePerGas" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result("0x5")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getBlockByNumber" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "baseFeePerGas": "0x64", "number": "0x1" }
        })))
        .mount(&server)
        .await;

    let provider = ResilientRpcProvider::new(
        "base-sepolia",
        84532,
        vec![RpcEndpoint::new(server.uri(), 1, "primary")],
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    let fees = provider.get_fee_estimate().await.unwrap();
    assert_eq!(fees.max_priority_fee_per_gas, 5);
    // 2 * 100 + 5
    assert_eq!(fees.max_fee_per_gas, 205);
}
