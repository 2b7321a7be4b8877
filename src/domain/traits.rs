//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::error::AppError;
use super::types::{
    BurnRequest, BurnResult, CreatedWallet, EnqueueJobRequest, Job, MintCompletion, MintRequest,
    MintResult, OrderDetails, PendingTransaction, ReceiptSummary,
};

/// Durable datastore contract for jobs and pending transactions.
///
/// The datastore is the single source of truth and the only synchronization
/// point across worker processes; cross-process coordination happens through
/// the atomic conditional updates exposed here.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Check datastore connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Insert a new PENDING job
    async fn enqueue_job(&self, request: &EnqueueJobRequest, chain: &str)
    -> Result<Job, AppError>;

    /// Get a single job by id
    async fn get_job(&self, id: &str) -> Result<Option<Job>, AppError>;

    /// List a customer's jobs, newest first
    async fn list_customer_jobs(
        &self,
        customer_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, AppError>;

    /// Select up to `limit` PENDING jobs whose `next_retry_at` is null or in
    /// the past, ordered oldest-created-first.
    async fn due_jobs(&self, limit: i64) -> Result<Vec<Job>, AppError>;

    /// Atomic conditional lock acquisition: succeeds only when the job is
    /// PENDING and unlocked (or its lock is stale). Returns false when
    /// another worker won the race; that is not an error.
    async fn try_acquire_job_lock(&self, job_id: &str, worker_id: &str)
    -> Result<bool, AppError>;

    /// Release locks held longer than `stale_after` by workers presumed
    /// dead. Returns the number of locks reclaimed.
    async fn release_stale_job_locks(&self, stale_after: Duration) -> Result<u64, AppError>;

    /// Mark a job COMPLETED with a result payload
    async fn complete_job(&self, job_id: &str, result: &serde_json::Value)
    -> Result<(), AppError>;

    /// Mark a job FAILED (terminal), releasing its lock
    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), AppError>;

    /// Mark a job FAILED after its last retryable failure, recording the
    /// final attempt count alongside the terminal status
    async fn fail_job_exhausted(
        &self,
        job_id: &str,
        error: &str,
        retry_count: i32,
    ) -> Result<(), AppError>;

    /// Return a job to PENDING with an incremented retry count and a future
    /// `next_retry_at`, releasing its lock
    async fn reschedule_job(
        &self,
        job_id: &str,
        error: &str,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Move a job to VERIFYING with the pending hash recorded
    async fn mark_job_verifying(&self, job_id: &str, tx_hash: &str) -> Result<(), AppError>;

    /// Persist a freshly derived wallet address onto the customer record
    async fn set_customer_wallet(&self, customer_id: &str, address: &str)
    -> Result<(), AppError>;

    /// Fetch denormalized order/customer/product details for a mint or burn
    async fn get_order_details(&self, order_id: &str) -> Result<Option<OrderDetails>, AppError>;

    /// Record a broadcast-but-unconfirmed transaction for the monitor
    async fn insert_pending_transaction(
        &self,
        job_id: &str,
        tx_hash: &str,
        chain: &str,
    ) -> Result<(), AppError>;

    /// Pending transactions submitted before `older_than`, still unresolved
    async fn due_pending_transactions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PendingTransaction>, AppError>;

    /// Persist an updated confirmation count and block number
    async fn update_pending_confirmations(
        &self,
        id: &str,
        confirmations: i32,
        block_number: i64,
    ) -> Result<(), AppError>;

    /// Terminal transition to confirmed
    async fn mark_pending_confirmed(&self, id: &str) -> Result<(), AppError>;

    /// Terminal transition to failed with a reason
    async fn mark_pending_failed(&self, id: &str, error: &str) -> Result<(), AppError>;

    /// Atomic multi-table mint completion: updates the job (only when it is
    /// not already terminal), inserts the certificate mirror row, and stamps
    /// the order, in one transaction. Safe to invoke from both the worker
    /// and the confirmation monitor.
    async fn complete_mint(&self, completion: &MintCompletion) -> Result<(), AppError>;
}

/// Business-level blockchain operations.
///
/// Implemented by the EVM client for configured deployments and by a
/// clearly-logged demo client otherwise; the job dispatcher never branches
/// on which one it holds.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Check RPC connectivity on the default chain
    async fn health_check(&self) -> Result<(), AppError>;

    /// Generate a new signing credential
    async fn create_wallet(&self) -> Result<CreatedWallet, AppError>;

    /// Submit a mint transaction, wait for inclusion, and extract the token
    /// id from the NFTMinted event. May fail with
    /// `BlockchainError::Unconfirmed` carrying the broadcast hash.
    async fn mint_certificate(&self, request: &MintRequest) -> Result<MintResult, AppError>;

    /// Burn tokens from the fee pool. Same submission and ambiguity
    /// semantics as minting.
    async fn burn_fee(&self, request: &BurnRequest) -> Result<BurnResult, AppError>;

    /// Fetch a receipt for the confirmation monitor, with the NFTMinted
    /// event already decoded when present. `Ok(None)` means the chain has
    /// not seen the transaction.
    async fn transaction_receipt(
        &self,
        chain: &str,
        tx_hash: &str,
    ) -> Result<Option<ReceiptSummary>, AppError>;

    /// Current block height on the given chain
    async fn block_number(&self, chain: &str) -> Result<u64, AppError>;
}
