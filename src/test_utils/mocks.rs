//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::{
    AppError, BlockchainError, BurnRequest, BurnResult, ChainClient, CreatedWallet,
    DatabaseError, EnqueueJobRequest, Job, JobStatus, JobStore, MintCompletion, MintRequest,
    MintResult, OrderDetails, PendingTransaction, PendingTxStatus, ReceiptSummary,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }
}

/// In-memory job store for testing.
///
/// Lock acquisition and completion guards mirror the conditional-update
/// semantics of the real store, so concurrency tests against this mock
/// exercise the same races.
pub struct MockJobStore {
    jobs: Mutex<HashMap<String, Job>>,
    pending: Mutex<HashMap<String, PendingTransaction>>,
    orders: Mutex<HashMap<String, OrderDetails>>,
    wallets: Mutex<HashMap<String, String>>,
    completions: Mutex<Vec<MintCompletion>>,
    config: MockConfig,
    is_healthy: AtomicBool,
}

impl MockJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            wallets: Mutex::new(HashMap::new()),
            completions: Mutex::new(Vec::new()),
            config,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Seed an order the handlers can look up
    pub fn insert_order(&self, order: OrderDetails) {
        self.orders
            .lock()
            .unwrap()
            .insert(order.order_id.clone(), order);
    }

    /// Seed a job directly, bypassing enqueue validation
    pub fn insert_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    /// Seed a pending transaction directly
    pub fn insert_pending(&self, tx: PendingTransaction) {
        self.pending.lock().unwrap().insert(tx.id.clone(), tx);
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn pending_for_job(&self, job_id: &str) -> Vec<PendingTransaction> {
        self.pending
            .lock()
            .unwrap()
            .values()
            .filter(|tx| tx.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn wallet_of(&self, customer_id: &str) -> Option<String> {
        self.wallets.lock().unwrap().get(customer_id).cloned()
    }

    /// Mint completions recorded through `complete_mint`
    pub fn mint_completions(&self) -> Vec<MintCompletion> {
        self.completions.lock().unwrap().clone()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(())
    }
}

impl Default for MockJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn enqueue_job(
        &self,
        request: &EnqueueJobRequest,
        chain: &str,
    ) -> Result<Job, AppError> {
        self.check_should_fail()?;
        let mut job = Job::new(
            Uuid::new_v4().to_string(),
            request.job_type,
            request.customer_id.clone(),
            chain.to_string(),
        );
        job.order_id = request.order_id.clone();
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, AppError> {
        self.check_should_fail()?;
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn list_customer_jobs(
        &self,
        customer_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, AppError> {
        self.check_should_fail()?;
        let jobs = self.jobs.lock().unwrap();
        let mut items: Vec<Job> = jobs
            .values()
            .filter(|j| j.customer_id == customer_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items.into_iter().take(limit as usize).collect())
    }

    async fn due_jobs(&self, limit: i64) -> Result<Vec<Job>, AppError> {
        self.check_should_fail()?;
        let now = Utc::now();
        let jobs = self.jobs.lock().unwrap();
        let mut items: Vec<Job> = jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && j.next_retry_at.map(|t| t <= now).unwrap_or(true)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items.into_iter().take(limit as usize).collect())
    }

    async fn try_acquire_job_lock(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(job_id) {
            Some(job) if job.status == JobStatus::Pending && job.worker_id.is_none() => {
                job.status = JobStatus::Processing;
                job.worker_id = Some(worker_id.to_string());
                job.locked_at = Some(Utc::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn release_stale_job_locks(&self, stale_after: Duration) -> Result<u64, AppError> {
        self.check_should_fail()?;
        let cutoff = Utc::now() - stale_after;
        let mut jobs = self.jobs.lock().unwrap();
        let mut released = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Processing
                && job.locked_at.map(|t| t < cutoff).unwrap_or(false)
            {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.locked_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn complete_job(
        &self,
        job_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Completed;
                job.result_data = Some(result.clone());
                job.completed_at = Some(Utc::now());
                job.worker_id = None;
                job.locked_at = None;
                job.error_message = None;
            }
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.completed_at = Some(Utc::now());
                job.worker_id = None;
                job.locked_at = None;
            }
        }
        Ok(())
    }

    async fn fail_job_exhausted(
        &self,
        job_id: &str,
        error: &str,
        retry_count: i32,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.retry_count = retry_count;
                job.completed_at = Some(Utc::now());
                job.worker_id = None;
                job.locked_at = None;
            }
        }
        Ok(())
    }

    async fn reschedule_job(
        &self,
        job_id: &str,
        error: &str,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            job.status = JobStatus::Pending;
            job.error_message = Some(error.to_string());
            job.retry_count = retry_count;
            job.next_retry_at = Some(next_retry_at);
            job.worker_id = None;
            job.locked_at = None;
        }
        Ok(())
    }

    async fn mark_job_verifying(&self, job_id: &str, tx_hash: &str) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            job.status = JobStatus::Verifying;
            job.result_data = Some(serde_json::json!({ "tx_hash": tx_hash }));
            job.worker_id = None;
            job.locked_at = None;
        }
        Ok(())
    }

    async fn set_customer_wallet(
        &self,
        customer_id: &str,
        address: &str,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.wallets
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), address.to_string());
        let mut orders = self.orders.lock().unwrap();
        for order in orders.values_mut() {
            if order.customer_id == customer_id {
                order.customer_wallet = Some(address.to_string());
            }
        }
        Ok(())
    }

    async fn get_order_details(&self, order_id: &str) -> Result<Option<OrderDetails>, AppError> {
        self.check_should_fail()?;
        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }

    async fn insert_pending_transaction(
        &self,
        job_id: &str,
        tx_hash: &str,
        chain: &str,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut pending = self.pending.lock().unwrap();
        if pending.values().any(|tx| tx.tx_hash == tx_hash) {
            return Ok(());
        }
        let id = Uuid::new_v4().to_string();
        pending.insert(
            id.clone(),
            PendingTransaction {
                id,
                job_id: job_id.to_string(),
                tx_hash: tx_hash.to_string(),
                chain: chain.to_string(),
                status: PendingTxStatus::Pending,
                confirmations: 0,
                block_number: None,
                submitted_at: Utc::now(),
                confirmed_at: None,
                error_message: None,
            },
        );
        Ok(())
    }

    async fn due_pending_transactions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PendingTransaction>, AppError> {
        self.check_should_fail()?;
        let pending = self.pending.lock().unwrap();
        let mut items: Vec<PendingTransaction> = pending
            .values()
            .filter(|tx| tx.status == PendingTxStatus::Pending && tx.submitted_at < older_than)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(items)
    }

    async fn update_pending_confirmations(
        &self,
        id: &str,
        confirmations: i32,
        block_number: i64,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut pending = self.pending.lock().unwrap();
        if let Some(tx) = pending.get_mut(id) {
            if tx.status == PendingTxStatus::Pending {
                tx.confirmations = tx.confirmations.max(confirmations);
                tx.block_number = Some(block_number);
            }
        }
        Ok(())
    }

    async fn mark_pending_confirmed(&self, id: &str) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut pending = self.pending.lock().unwrap();
        if let Some(tx) = pending.get_mut(id) {
            if tx.status == PendingTxStatus::Pending {
                tx.status = PendingTxStatus::Confirmed;
                tx.confirmed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn mark_pending_failed(&self, id: &str, error: &str) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut pending = self.pending.lock().unwrap();
        if let Some(tx) = pending.get_mut(id) {
            if tx.status == PendingTxStatus::Pending {
                tx.status = PendingTxStatus::Failed;
                tx.error_message = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn complete_mint(&self, completion: &MintCompletion) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&completion.job_id) {
            // First caller past the guard wins; everyone else no-ops
            if job.status.is_terminal() {
                return Ok(());
            }
            job.status = JobStatus::Completed;
            job.result_data = Some(serde_json::json!({
                "token_id": completion.token_id,
                "tx_hash": completion.tx_hash,
                "block_number": completion.block_number,
            }));
            job.completed_at = Some(Utc::now());
            job.worker_id = None;
            job.locked_at = None;
            job.error_message = None;
        }
        self.completions.lock().unwrap().push(completion.clone());
        Ok(())
    }
}

/// Mock chain client with scripted outcomes.
///
/// Mint and burn results are consumed front-to-back; with no script the
/// client succeeds with generated placeholders.
pub struct MockChainClient {
    mint_script: Mutex<VecDeque<Result<MintResult, AppError>>>,
    burn_script: Mutex<VecDeque<Result<BurnResult, AppError>>>,
    receipts: Mutex<HashMap<String, ReceiptSummary>>,
    mint_requests: Mutex<Vec<MintRequest>>,
    burn_requests: Mutex<Vec<BurnRequest>>,
    block_number: AtomicU64,
    wallet_counter: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockChainClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mint_script: Mutex::new(VecDeque::new()),
            burn_script: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(HashMap::new()),
            mint_requests: Mutex::new(Vec::new()),
            burn_requests: Mutex::new(Vec::new()),
            block_number: AtomicU64::new(1_000),
            wallet_counter: AtomicU64::new(1),
            is_healthy: AtomicBool::new(true),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Script the next mint outcome
    pub fn push_mint_result(&self, result: Result<MintResult, AppError>) {
        self.mint_script.lock().unwrap().push_back(result);
    }

    /// Script the next burn outcome
    pub fn push_burn_result(&self, result: Result<BurnResult, AppError>) {
        self.burn_script.lock().unwrap().push_back(result);
    }

    /// Make `transaction_receipt` return this summary for the given hash
    pub fn set_receipt(&self, tx_hash: impl Into<String>, receipt: ReceiptSummary) {
        self.receipts.lock().unwrap().insert(tx_hash.into(), receipt);
    }

    pub fn set_block_number(&self, block: u64) {
        self.block_number.store(block, Ordering::SeqCst);
    }

    /// Mint requests observed so far
    pub fn mint_requests(&self) -> Vec<MintRequest> {
        self.mint_requests.lock().unwrap().clone()
    }

    /// Burn requests observed so far
    pub fn burn_requests(&self) -> Vec<BurnRequest> {
        self.burn_requests.lock().unwrap().clone()
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Blockchain(BlockchainError::Transient(
                "Unhealthy".to_string(),
            )));
        }
        Ok(())
    }

    async fn create_wallet(&self) -> Result<CreatedWallet, AppError> {
        let n = self.wallet_counter.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedWallet {
            address: format!("0x{:040x}", n),
            private_key: SecretString::from(format!("0x{:064x}", n)),
        })
    }

    async fn mint_certificate(&self, request: &MintRequest) -> Result<MintResult, AppError> {
        self.mint_requests.lock().unwrap().push(request.clone());
        if let Some(scripted) = self.mint_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(MintResult {
            token_id: "42".to_string(),
            tx_hash: format!("0xmint_{}", request.order_id),
            block_number: self.block_number.load(Ordering::SeqCst),
        })
    }

    async fn burn_fee(&self, request: &BurnRequest) -> Result<BurnResult, AppError> {
        self.burn_requests.lock().unwrap().push(request.clone());
        if let Some(scripted) = self.burn_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(BurnResult {
            tx_hash: format!("0xburn_{}", request.order_id),
            block_number: self.block_number.load(Ordering::SeqCst),
        })
    }

    async fn transaction_receipt(
        &self,
        _chain: &str,
        tx_hash: &str,
    ) -> Result<Option<ReceiptSummary>, AppError> {
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }

    async fn block_number(&self, _chain: &str) -> Result<u64, AppError> {
        Ok(self.block_number.load(Ordering::SeqCst))
    }
}
