//! Resilient multi-endpoint JSON-RPC provider.
//!
//! Presents a single logical RPC client backed by a prioritized endpoint
//! list for one chain. Transport failures are recorded against the current
//! endpoint's health window and surface as retryable errors while another
//! healthy endpoint remains, so the retry executor immediately re-runs the
//! call against the next endpoint. JSON-RPC application errors (nonce
//! conflicts, insufficient funds, reverts) are classified into the error
//! taxonomy and returned without failover: a healthy endpoint reporting a
//! business error is not an unhealthy endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use alloy::rpc::types::TransactionReceipt;

use crate::domain::{AppError, BlockchainError, ConfigError};
use crate::infra::retry::{RetryPolicy, execute_with_retry};

/// Consecutive failures within the reset window before an endpoint is skipped
pub const MAX_ENDPOINT_FAILURES: u32 = 3;

/// Window after which an endpoint's failure counter resets to zero
pub const FAILURE_RESET_WINDOW: Duration = Duration::from_secs(60);

/// One candidate network entry point for a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub url: String,
    /// Lower = preferred
    pub priority: u32,
    pub name: String,
}

impl RpcEndpoint {
    #[must_use]
    pub fn new(url: impl Into<String>, priority: u32, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            priority,
            name: name.into(),
        }
    }
}

/// Built-in endpoint lists per chain key, overridable per environment.
#[must_use]
pub fn default_endpoints(chain: &str) -> Option<Vec<RpcEndpoint>> {
    match chain {
        "base-sepolia" => Some(vec![
            RpcEndpoint::new("https://sepolia.base.org", 1, "Base Sepolia Official"),
            RpcEndpoint::new(
                "https://base-sepolia.blockpi.network/v1/rpc/public",
                2,
                "BlockPI",
            ),
            RpcEndpoint::new("https://base-sepolia-rpc.publicnode.com", 3, "PublicNode"),
        ]),
        "base" => Some(vec![
            RpcEndpoint::new("https://mainnet.base.org", 1, "Base Mainnet Official"),
            RpcEndpoint::new("https://base.blockpi.network/v1/rpc/public", 2, "BlockPI"),
            RpcEndpoint::new("https://base-rpc.publicnode.com", 3, "PublicNode"),
        ]),
        "polygon" => Some(vec![
            RpcEndpoint::new("https://polygon-rpc.com", 1, "Polygon Official"),
            RpcEndpoint::new("https://polygon.blockpi.network/v1/rpc/public", 2, "BlockPI"),
            RpcEndpoint::new("https://polygon-bor-rpc.publicnode.com", 3, "PublicNode"),
        ]),
        _ => None,
    }
}

/// EIP-1559 fee estimate in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[derive(Debug, Default)]
struct EndpointHealth {
    failures: u32,
    window_start: Option<Instant>,
}

impl EndpointHealth {
    fn record_failure(&mut self, now: Instant) {
        match self.window_start {
            Some(start) if now.duration_since(start) < FAILURE_RESET_WINDOW => {
                self.failures += 1;
            }
            // Window elapsed (or first failure): counter restarts
            _ => {
                self.failures = 1;
                self.window_start = Some(now);
            }
        }
    }

    fn failures_in_window(&self, now: Instant) -> u32 {
        match self.window_start {
            Some(start) if now.duration_since(start) < FAILURE_RESET_WINDOW => self.failures,
            _ => 0,
        }
    }

    fn is_healthy(&self, now: Instant) -> bool {
        self.failures_in_window(now) < MAX_ENDPOINT_FAILURES
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Classify a JSON-RPC error payload into the closed taxonomy.
///
/// This is the only place raw error strings are inspected; everything
/// downstream matches on tags.
pub(crate) fn classify_rpc_error(code: i64, message: &str) -> BlockchainError {
    let lower = message.to_lowercase();

    if lower.contains("nonce too low")
        || lower.contains("nonce has already been used")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("already known")
    {
        return BlockchainError::NonceConflict(message.to_string());
    }

    if lower.contains("insufficient funds") {
        return BlockchainError::InsufficientFunds;
    }

    if lower.contains("execution reverted") {
        return BlockchainError::Reverted(message.to_string());
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("too many requests")
        || code == -32005
    {
        return BlockchainError::Transient(message.to_string());
    }

    BlockchainError::Rpc(message.to_string())
}

/// Multi-endpoint JSON-RPC client for one chain
pub struct ResilientRpcProvider {
    chain: String,
    chain_id: u64,
    endpoints: Vec<RpcEndpoint>,
    health: Mutex<HashMap<String, EndpointHealth>>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl ResilientRpcProvider {
    /// Requires at least one endpoint; endpoints are sorted ascending by
    /// priority.
    pub fn new(
        chain: impl Into<String>,
        chain_id: u64,
        mut endpoints: Vec<RpcEndpoint>,
    ) -> Result<Self, AppError> {
        if endpoints.is_empty() {
            return Err(AppError::Config(ConfigError::Invalid {
                field: "rpc_endpoints".to_string(),
                message: "at least one RPC endpoint is required".to_string(),
            }));
        }
        endpoints.sort_by_key(|e| e.priority);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            chain: chain.into(),
            chain_id,
            endpoints,
            health: Mutex::new(HashMap::new()),
            http,
            retry: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
        })
    }

    /// Replace the retry policy (tests use millisecond delays).
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Failures recorded against `url` within the current reset window
    #[must_use]
    pub fn failure_count(&self, url: &str) -> u32 {
        let health = self.health.lock().unwrap();
        health
            .get(url)
            .map(|h| h.failures_in_window(Instant::now()))
            .unwrap_or(0)
    }

    /// Highest-priority endpoint whose failure count is below the threshold
    fn pick_endpoint(&self) -> Option<RpcEndpoint> {
        let now = Instant::now();
        let health = self.health.lock().unwrap();
        self.endpoints
            .iter()
            .find(|e| {
                health
                    .get(&e.url)
                    .map(|h| h.is_healthy(now))
                    .unwrap_or(true)
            })
            .cloned()
    }

    fn record_failure(&self, url: &str) {
        let mut health = self.health.lock().unwrap();
        health
            .entry(url.to_string())
            .or_default()
            .record_failure(Instant::now());
    }

    fn transport_failure(&self, endpoint: &RpcEndpoint, message: String) -> AppError {
        self.record_failure(&endpoint.url);

        if self.pick_endpoint().is_some() {
            warn!(
                chain = %self.chain,
                endpoint = %endpoint.name,
                error = %message,
                "RPC endpoint failed, failing over"
            );
            AppError::Blockchain(BlockchainError::Transient(format!(
                "RPC call failed on {}: {}",
                endpoint.name, message
            )))
        } else {
            warn!(chain = %self.chain, "All RPC endpoints are unhealthy");
            AppError::Blockchain(BlockchainError::Rpc(message))
        }
    }

    /// Send one JSON-RPC request, with endpoint failover wrapped in the
    /// retry executor.
    pub async fn send(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        execute_with_retry(&self.retry, || self.send_once(method, params.clone())).await
    }

    async fn send_once(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let endpoint = self.pick_endpoint().ok_or_else(|| {
            AppError::Blockchain(BlockchainError::Rpc(format!(
                "all RPC endpoints for {} are unhealthy",
                self.chain
            )))
        })?;

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        debug!(chain = %self.chain, endpoint = %endpoint.name, method = %method, "RPC request");

        let response = self
            .http
            .post(&endpoint.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_failure(&endpoint, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(self.transport_failure(&endpoint, format!("HTTP status {}", status)));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| self.transport_failure(&endpoint, format!("invalid response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(AppError::Blockchain(classify_rpc_error(
                err.code,
                &err.message,
            )));
        }

        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }

    pub async fn get_block_number(&self) -> Result<u64, AppError> {
        let result = self.send("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&result)
    }

    /// Pending-inclusive transaction count for an address
    pub async fn get_transaction_count(&self, address: &str) -> Result<u64, AppError> {
        let result = self
            .send(
                "eth_getTransactionCount",
                serde_json::json!([address, "pending"]),
            )
            .await?;
        parse_quantity(&result)
    }

    /// EIP-1559 fee estimate: `max_fee = 2 * base_fee + priority_fee`
    pub async fn get_fee_estimate(&self) -> Result<FeeEstimate, AppError> {
        let priority = self
            .send("eth_maxPriorityFeePerGas", serde_json::json!([]))
            .await?;
        let max_priority_fee_per_gas = parse_quantity_u128(&priority)?;

        let block = self
            .send("eth_getBlockByNumber", serde_json::json!(["latest", false]))
            .await?;
        let base_fee = block.get("baseFeePerGas").ok_or_else(|| {
            AppError::Blockchain(BlockchainError::Rpc(
                "latest block has no baseFeePerGas".to_string(),
            ))
        })?;
        let base_fee = parse_quantity_u128(base_fee)?;

        Ok(FeeEstimate {
            max_fee_per_gas: base_fee * 2 + max_priority_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }

    pub async fn estimate_gas(
        &self,
        from: &str,
        to: &str,
        data: &str,
    ) -> Result<u64, AppError> {
        let result = self
            .send(
                "eth_estimateGas",
                serde_json::json!([{ "from": from, "to": to, "data": data }]),
            )
            .await?;
        parse_quantity(&result)
    }

    /// Broadcast a signed raw transaction, returning its hash
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, AppError> {
        let result = self
            .send(
                "eth_sendRawTransaction",
                serde_json::json!([alloy::hex::encode_prefixed(raw)]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Blockchain(BlockchainError::Rpc(
                    "eth_sendRawTransaction returned a non-string result".to_string(),
                ))
            })
    }

    /// `Ok(None)` when the chain has not seen the transaction
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, AppError> {
        let result = self
            .send("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: TransactionReceipt = serde_json::from_value(result).map_err(|e| {
            AppError::Blockchain(BlockchainError::Rpc(format!(
                "malformed transaction receipt: {}",
                e
            )))
        })?;
        Ok(Some(receipt))
    }
}

fn parse_quantity(value: &serde_json::Value) -> Result<u64, AppError> {
    let s = value.as_str().ok_or_else(|| {
        AppError::Blockchain(BlockchainError::Rpc(format!(
            "expected hex quantity, got {}",
            value
        )))
    })?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| {
        AppError::Blockchain(BlockchainError::Rpc(format!(
            "invalid hex quantity {}: {}",
            s, e
        )))
    })
}

fn parse_quantity_u128(value: &serde_json::Value) -> Result<u128, AppError> {
    let s = value.as_str().ok_or_else(|| {
        AppError::Blockchain(BlockchainError::Rpc(format!(
            "expected hex quantity, got {}",
            value
        )))
    })?;
    u128::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| {
        AppError::Blockchain(BlockchainError::Rpc(format!(
            "invalid hex quantity {}: {}",
            s, e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_at_least_one_endpoint() {
        let result = ResilientRpcProvider::new("base-sepolia", 84532, vec![]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_endpoints_sorted_by_priority() {
        let provider = ResilientRpcProvider::new(
            "base-sepolia",
            84532,
            vec![
                RpcEndpoint::new("http://c", 3, "c"),
                RpcEndpoint::new("http://a", 1, "a"),
                RpcEndpoint::new("http://b", 2, "b"),
            ],
        )
        .unwrap();

        assert_eq!(provider.pick_endpoint().unwrap().name, "a");
    }

    #[test]
    fn test_unhealthy_endpoint_is_skipped() {
        let provider = ResilientRpcProvider::new(
            "base-sepolia",
            84532,
            vec![
                RpcEndpoint::new("http://a", 1, "a"),
                RpcEndpoint::new("http://b", 2, "b"),
            ],
        )
        .unwrap();

        for _ in 0..MAX_ENDPOINT_FAILURES {
            provider.record_failure("http://a");
        }
        assert_eq!(provider.failure_count("http://a"), MAX_ENDPOINT_FAILURES);
        assert_eq!(provider.pick_endpoint().unwrap().name, "b");
    }

    #[test]
    fn test_no_healthy_endpoint_left() {
        let provider = ResilientRpcProvider::new(
            "base-sepolia",
            84532,
            vec![RpcEndpoint::new("http://a", 1, "a")],
        )
        .unwrap();

        for _ in 0..MAX_ENDPOINT_FAILURES {
            provider.record_failure("http://a");
        }
        assert!(provider.pick_endpoint().is_none());
    }

    #[test]
    fn test_failure_window_self_heals() {
        let mut health = EndpointHealth::default();
        let start = Instant::now();
        for _ in 0..MAX_ENDPOINT_FAILURES {
            health.record_failure(start);
        }
        assert!(!health.is_healthy(start));

        // After the reset window the counter reads as zero again
        let later = start + FAILURE_RESET_WINDOW + Duration::from_secs(1);
        assert!(health.is_healthy(later));
        assert_eq!(health.failures_in_window(later), 0);

        // And a new failure starts a fresh window at one
        health.record_failure(later);
        assert_eq!(health.failures_in_window(later), 1);
    }

    #[test]
    fn test_classify_rpc_error() {
        assert!(matches!(
            classify_rpc_error(-32000, "nonce too low: next nonce 5"),
            BlockchainError::NonceConflict(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32000, "replacement transaction underpriced"),
            BlockchainError::NonceConflict(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32000, "insufficient funds for gas * price + value"),
            BlockchainError::InsufficientFunds
        ));
        assert!(matches!(
            classify_rpc_error(3, "execution reverted: not owner"),
            BlockchainError::Reverted(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32005, "request limit reached"),
            BlockchainError::Transient(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32601, "method not found"),
            BlockchainError::Rpc(_)
        ));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&serde_json::json!("0x10")).unwrap(), 16);
        assert_eq!(parse_quantity(&serde_json::json!("0x0")).unwrap(), 0);
        assert!(parse_quantity(&serde_json::json!(16)).is_err());
        assert!(parse_quantity(&serde_json::json!("zz")).is_err());
    }

    #[test]
    fn test_default_endpoints_per_chain() {
        assert_eq!(default_endpoints("base-sepolia").unwrap().len(), 3);
        assert_eq!(default_endpoints("base").unwrap().len(), 3);
        assert_eq!(default_endpoints("polygon").unwrap().len(), 3);
        assert!(default_endpoints("unknown-chain").is_none());
    }
}
