//! Domain types with validation support.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use validator::Validate;

/// Kind of deferred blockchain work carried by a job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Generate a signing credential for a customer
    CreateWallet,
    /// Mint an authenticity certificate for an order
    MintNft,
    /// Burn a percentage of the order value from the fee pool
    BurnFee,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateWallet => "CREATE_WALLET",
            Self::MintNft => "MINT_NFT",
            Self::BurnFee => "BURN_FEE",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE_WALLET" => Ok(Self::CreateWallet),
            "MINT_NFT" => Ok(Self::MintNft),
            "BURN_FEE" => Ok(Self::BurnFee),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting to be picked up by a worker
    #[default]
    Pending,
    /// A worker holds the lock and is handling the job
    Processing,
    /// Transaction broadcast, awaiting safe confirmation depth
    Verifying,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Verifying => "VERIFYING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED never transition further.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "VERIFYING" => Ok(Self::Verifying),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of deferred blockchain work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Job {
    /// Unique identifier (UUID)
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Owning customer
    pub customer_id: String,
    /// Associated order (required for MINT_NFT and BURN_FEE)
    pub order_id: Option<String>,
    /// Target chain key (e.g. "base-sepolia")
    #[schema(example = "base-sepolia")]
    pub chain: String,
    /// Number of failed attempts so far
    pub retry_count: i32,
    /// Last error message, readable from the customer's account view
    pub error_message: Option<String>,
    /// Earliest time this job may be re-selected
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Lock owner, set while a worker is handling the job
    pub worker_id: Option<String>,
    /// Lock timestamp, used for stale-lock reclamation
    pub locked_at: Option<DateTime<Utc>>,
    /// Opaque result payload written on completion
    pub result_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    #[must_use]
    pub fn new(id: String, job_type: JobType, customer_id: String, chain: String) -> Self {
        Self {
            id,
            job_type,
            status: JobStatus::Pending,
            customer_id,
            order_id: None,
            chain,
            retry_count: 0,
            error_message: None,
            next_retry_at: None,
            worker_id: None,
            locked_at: None,
            result_data: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Request to enqueue a new job
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct EnqueueJobRequest {
    pub job_type: JobType,
    /// Owning customer
    #[validate(length(min = 1, message = "Customer id is required"))]
    pub customer_id: String,
    /// Order reference (required for MINT_NFT and BURN_FEE)
    pub order_id: Option<String>,
    /// Target chain key; defaults to the deployment's primary chain
    #[schema(example = "base-sepolia")]
    pub chain: Option<String>,
}

/// Confirmation state of a broadcast transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PendingTxStatus {
    /// Broadcast, not yet at safe confirmation depth
    #[default]
    Pending,
    /// Reached safe confirmation depth
    Confirmed,
    /// Reverted, or never seen on-chain within the grace window
    Failed,
}

impl PendingTxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PendingTxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid pending transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for PendingTxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted, not-yet-safely-confirmed transaction.
///
/// Decouples submission from confirmation so a slow transaction does not
/// block the job worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PendingTransaction {
    pub id: String,
    /// Owning job
    pub job_id: String,
    /// Transaction hash, unique per submission attempt
    pub tx_hash: String,
    /// Chain the transaction was broadcast on
    pub chain: String,
    pub status: PendingTxStatus,
    /// Monotonically non-decreasing while status is pending
    pub confirmations: i32,
    pub block_number: Option<i64>,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Parameters for minting one authenticity certificate
#[derive(Debug, Clone, PartialEq)]
pub struct MintRequest {
    pub recipient_address: String,
    pub product_id: String,
    pub order_id: String,
    pub brand: String,
    pub product_name: String,
    pub token_uri: String,
    pub chain: String,
}

/// Result of a confirmed mint
#[derive(Debug, Clone, PartialEq)]
pub struct MintResult {
    /// Token id extracted from the NFTMinted event
    pub token_id: String,
    pub tx_hash: String,
    pub block_number: u64,
}

/// Parameters for a fee burn
#[derive(Debug, Clone, PartialEq)]
pub struct BurnRequest {
    /// Amount in wei, decimal string
    pub amount_wei: String,
    pub reason: String,
    pub order_id: String,
    pub chain: String,
}

/// Result of a confirmed burn
#[derive(Debug, Clone, PartialEq)]
pub struct BurnResult {
    pub tx_hash: String,
    pub block_number: u64,
}

/// A freshly generated signing credential
pub struct CreatedWallet {
    pub address: String,
    /// Never logged or serialized
    pub private_key: SecretString,
}

/// Denormalized order details needed by the MINT_NFT and BURN_FEE handlers
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub order_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub product_name: String,
    pub brand: String,
    pub total_price: f64,
    pub customer_wallet: Option<String>,
}

/// Fields written by the atomic mint-completion procedure
#[derive(Debug, Clone, PartialEq)]
pub struct MintCompletion {
    pub job_id: String,
    pub customer_id: String,
    pub order_id: String,
    pub product_id: String,
    pub token_id: String,
    pub tx_hash: String,
    pub block_number: i64,
    pub owner_address: String,
    pub chain: String,
    pub chain_id: i64,
}

/// Minted-event fields re-derived from a receipt
#[derive(Debug, Clone, PartialEq)]
pub struct MintedToken {
    pub token_id: String,
    pub owner_address: String,
}

/// Condensed receipt view used by the confirmation monitor
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptSummary {
    /// False when the chain reports reversion
    pub success: bool,
    pub block_number: u64,
    /// Decoded NFTMinted event, when the receipt carries one
    pub minted: Option<MintedToken>,
}

/// Per-chain deployment policy: numeric chain id and the confirmation depth
/// above which a transaction is treated as practically irreversible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub safe_confirmations: u64,
}

impl ChainSettings {
    /// Built-in defaults, overridable per environment.
    #[must_use]
    pub fn defaults() -> HashMap<String, ChainSettings> {
        HashMap::from([
            (
                "base-sepolia".to_string(),
                ChainSettings {
                    chain_id: 84532,
                    safe_confirmations: 30,
                },
            ),
            (
                "base".to_string(),
                ChainSettings {
                    chain_id: 8453,
                    safe_confirmations: 30,
                },
            ),
            (
                "polygon".to_string(),
                ChainSettings {
                    chain_id: 137,
                    safe_confirmations: 128,
                },
            ),
        ])
    }
}

/// Query parameters for job listings
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct JobListParams {
    /// Maximum number of jobs to return (1-100, default: 20)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    #[schema(example = 20)]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

impl Default for JobListParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some systems degraded but functional
    Degraded,
    /// Critical systems unavailable
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Database health status
    pub database: HealthStatus,
    /// Blockchain client health status
    pub blockchain: HealthStatus,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, blockchain: HealthStatus) -> Self {
        let status = match (&database, &blockchain) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            blockchain,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "validation_error")]
    pub r#type: String,
    /// Human-readable error message
    #[schema(example = "Order id is required for MINT_NFT jobs")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_job_status_display_and_parsing() {
        let statuses = vec![
            (JobStatus::Pending, "PENDING"),
            (JobStatus::Processing, "PROCESSING"),
            (JobStatus::Verifying, "VERIFYING"),
            (JobStatus::Completed, "COMPLETED"),
            (JobStatus::Failed, "FAILED"),
        ];

        for (status, string) in statuses {
            assert_eq!(status.as_str(), string);
            assert_eq!(status.to_string(), string);
            assert_eq!(JobStatus::from_str(string).unwrap(), status);
        }

        assert!(JobStatus::from_str("invalid").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Verifying.is_terminal());
    }

    #[test]
    fn test_job_type_parsing() {
        for (ty, s) in [
            (JobType::CreateWallet, "CREATE_WALLET"),
            (JobType::MintNft, "MINT_NFT"),
            (JobType::BurnFee, "BURN_FEE"),
        ] {
            assert_eq!(ty.as_str(), s);
            assert_eq!(JobType::from_str(s).unwrap(), ty);
        }
        assert!(JobType::from_str("MINT").is_err());
    }

    #[test]
    fn test_pending_tx_status_parsing() {
        for (status, s) in [
            (PendingTxStatus::Pending, "pending"),
            (PendingTxStatus::Confirmed, "confirmed"),
            (PendingTxStatus::Failed, "failed"),
        ] {
            assert_eq!(status.as_str(), s);
            assert_eq!(PendingTxStatus::from_str(s).unwrap(), status);
        }
        assert!(PendingTxStatus::from_str("PENDING").is_err());
    }

    #[test]
    fn test_job_initialization_defaults() {
        let job = Job::new(
            "job_1".to_string(),
            JobType::MintNft,
            "cust_1".to_string(),
            "base-sepolia".to_string(),
        );

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
        assert!(job.worker_id.is_none());
        assert!(job.locked_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_enqueue_request_validation() {
        let req = EnqueueJobRequest {
            job_type: JobType::CreateWallet,
            customer_id: "cust_1".to_string(),
            order_id: None,
            chain: None,
        };
        assert!(req.validate().is_ok());

        let req = EnqueueJobRequest {
            job_type: JobType::CreateWallet,
            customer_id: "".to_string(),
            order_id: None,
            chain: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_chain_settings_defaults() {
        let defaults = ChainSettings::defaults();
        assert_eq!(defaults["base-sepolia"].chain_id, 84532);
        assert_eq!(defaults["base-sepolia"].safe_confirmations, 30);
        assert_eq!(defaults["polygon"].chain_id, 137);
        assert_eq!(defaults["polygon"].safe_confirmations, 128);
    }

    #[test]
    fn test_job_serialization_roundtrip() {
        let job = Job::new(
            "job_42".to_string(),
            JobType::BurnFee,
            "cust_9".to_string(),
            "polygon".to_string(),
        );

        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"BURN_FEE\""));
        assert!(json.contains("\"PENDING\""));

        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
