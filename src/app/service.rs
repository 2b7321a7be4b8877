//! Job queue service: enqueueing, dispatch, and failure routing.
//!
//! The datastore is the single source of truth; this layer holds no job
//! state of its own, so any number of processes can run it concurrently.

use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, BlockchainError, BurnRequest, ChainClient, ChainSettings, EnqueueJobRequest,
    HealthResponse, HealthStatus, Job, JobStore, JobType, MintCompletion, MintRequest,
    OrderDetails, ValidationError,
};

/// Maximum jobs claimed per processing cycle
const BATCH_SIZE: i64 = 20;

/// Attempts after which a job is terminally failed
const MAX_JOB_RETRIES: i32 = 3;

/// Locks older than this belong to workers presumed dead
const STALE_LOCK_MINUTES: i64 = 10;

/// Share of the order value burned from the fee pool, in percent
const BURN_FEE_PERCENT: f64 = 5.0;

/// Service configuration resolved at startup
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// Chain used when an enqueue request does not name one
    pub default_chain: String,
    /// Host serving token metadata, e.g. "certificates.example.com"
    pub token_uri_host: String,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            default_chain: "base-sepolia".to_string(),
            token_uri_host: "localhost".to_string(),
        }
    }
}

/// Job pipeline business logic
pub struct JobService {
    store: Arc<dyn JobStore>,
    chain_client: Arc<dyn ChainClient>,
    settings: HashMap<String, ChainSettings>,
    config: JobServiceConfig,
    /// Identifies this process in job locks
    worker_id: String,
}

impl JobService {
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        chain_client: Arc<dyn ChainClient>,
        settings: HashMap<String, ChainSettings>,
        config: JobServiceConfig,
    ) -> Self {
        let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
        Self {
            store,
            chain_client,
            settings,
            config,
            worker_id,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Validate and persist a new job. Returns immediately; execution
    /// happens in the background processing cycle.
    #[instrument(skip(self, request), fields(job_type = %request.job_type, customer_id = %request.customer_id))]
    pub async fn enqueue_job(&self, request: &EnqueueJobRequest) -> Result<Job, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        if matches!(request.job_type, JobType::MintNft | JobType::BurnFee)
            && request.order_id.as_deref().unwrap_or("").is_empty()
        {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "order_id".to_string(),
                message: format!("Order id is required for {} jobs", request.job_type),
            }));
        }

        let chain = request
            .chain
            .as_deref()
            .unwrap_or(&self.config.default_chain);
        if !self.settings.contains_key(chain) {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "chain".to_string(),
                message: format!("Unknown chain: {}", chain),
            }));
        }

        let job = self.store.enqueue_job(request, chain).await?;
        info!(id = %job.id, "Job enqueued");
        Ok(job)
    }

    /// Get a job by id
    #[instrument(skip(self))]
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, AppError> {
        self.store.get_job(id).await
    }

    /// List a customer's jobs, newest first
    #[instrument(skip(self))]
    pub async fn list_customer_jobs(
        &self,
        customer_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, AppError> {
        self.store.list_customer_jobs(customer_id, limit).await
    }

    /// One processing cycle: reclaim stale locks, claim due jobs, execute
    /// them. Returns the number of jobs this worker actually handled.
    ///
    /// Per-job failures are routed into the job's own lifecycle and never
    /// abort the cycle.
    #[instrument(skip(self))]
    pub async fn process_jobs(&self) -> Result<usize, AppError> {
        let reclaimed = self
            .store
            .release_stale_job_locks(Duration::minutes(STALE_LOCK_MINUTES))
            .await?;
        if reclaimed > 0 {
            warn!(count = reclaimed, "Reclaimed stale job locks");
        }

        let due = self.store.due_jobs(BATCH_SIZE).await?;
        if due.is_empty() {
            return Ok(0);
        }

        info!(count = due.len(), "Processing due jobs");
        let mut handled = 0;

        for job in due {
            // Retry budget is checked at pickup so jobs rescheduled by a
            // worker that died mid-update still terminate.
            if job.retry_count >= MAX_JOB_RETRIES {
                self.store
                    .fail_job(&job.id, "Maximum retry attempts exceeded")
                    .await?;
                warn!(id = %job.id, retry_count = job.retry_count, "Job failed: retry budget exhausted");
                continue;
            }

            if !self
                .store
                .try_acquire_job_lock(&job.id, &self.worker_id)
                .await?
            {
                // Lost the race to another worker
                continue;
            }

            if let Err(e) = self.process_locked_job(&job).await {
                error!(id = %job.id, error = ?e, "Failed to record job outcome");
            }
            handled += 1;
        }

        Ok(handled)
    }

    /// Execute one locked job and route its outcome.
    async fn process_locked_job(&self, job: &Job) -> Result<(), AppError> {
        info!(id = %job.id, job_type = %job.job_type, attempt = job.retry_count + 1, "Executing job");

        let outcome = match job.job_type {
            JobType::CreateWallet => self.handle_create_wallet(job).await,
            JobType::MintNft => self.handle_mint_nft(job).await,
            JobType::BurnFee => self.handle_burn_fee(job).await,
        };

        match outcome {
            Ok(()) => Ok(()),
            // The transaction is on-chain but not yet safely confirmed; the
            // monitor owns it from here. Not a failure.
            Err(AppError::Blockchain(BlockchainError::Unconfirmed { tx_hash })) => {
                info!(id = %job.id, tx_hash = %tx_hash, "Handing job to confirmation monitor");
                self.store
                    .insert_pending_transaction(&job.id, &tx_hash, &job.chain)
                    .await?;
                self.store.mark_job_verifying(&job.id, &tx_hash).await
            }
            Err(e) if e.is_retryable() => {
                let retry_count = job.retry_count + 1;
                if retry_count >= MAX_JOB_RETRIES {
                    warn!(id = %job.id, retry_count = retry_count, error = %e, "Job failed: retry budget exhausted");
                    return self
                        .store
                        .fail_job_exhausted(&job.id, &e.to_string(), retry_count)
                        .await;
                }
                // Minutes-scale backoff; the seconds-scale retries inside the
                // chain client already ran.
                let next_retry_at = Utc::now() + Duration::minutes(1 << retry_count);
                warn!(
                    id = %job.id,
                    retry_count = retry_count,
                    next_retry_at = %next_retry_at,
                    error = %e,
                    "Job rescheduled"
                );
                self.store
                    .reschedule_job(&job.id, &e.to_string(), retry_count, next_retry_at)
                    .await
            }
            Err(e) => {
                // Fatal errors skip the retry budget entirely
                warn!(id = %job.id, error = %e, "Job failed permanently");
                self.store.fail_job(&job.id, &e.to_string()).await
            }
        }
    }

    async fn handle_create_wallet(&self, job: &Job) -> Result<(), AppError> {
        let wallet = self.chain_client.create_wallet().await?;

        self.store
            .set_customer_wallet(&job.customer_id, &wallet.address)
            .await?;

        // The private key is handed to custody out of band; only the
        // address is recorded here.
        self.store
            .complete_job(&job.id, &json!({ "address": wallet.address }))
            .await?;

        info!(id = %job.id, customer_id = %job.customer_id, address = %wallet.address, "Wallet created");
        Ok(())
    }

    async fn handle_mint_nft(&self, job: &Job) -> Result<(), AppError> {
        let order = self.order_for_job(job).await?;
        let recipient = order.customer_wallet.clone().ok_or_else(|| {
            AppError::Validation(ValidationError::InvalidField {
                field: "customer_wallet".to_string(),
                message: format!("Customer {} has no wallet address", order.customer_id),
            })
        })?;

        let request = MintRequest {
            recipient_address: recipient.clone(),
            product_id: order.product_id.clone(),
            order_id: order.order_id.clone(),
            brand: order.brand.clone(),
            product_name: order.product_name.clone(),
            token_uri: format!(
                "https://{}/nft/{}",
                self.config.token_uri_host, order.order_id
            ),
            chain: job.chain.clone(),
        };

        let result = self.chain_client.mint_certificate(&request).await?;

        let chain_id = self
            .settings
            .get(&job.chain)
            .map(|s| s.chain_id as i64)
            .unwrap_or(0);

        self.store
            .complete_mint(&MintCompletion {
                job_id: job.id.clone(),
                customer_id: order.customer_id.clone(),
                order_id: order.order_id.clone(),
                product_id: order.product_id.clone(),
                token_id: result.token_id.clone(),
                tx_hash: result.tx_hash.clone(),
                block_number: result.block_number as i64,
                owner_address: recipient,
                chain: job.chain.clone(),
                chain_id,
            })
            .await?;

        info!(id = %job.id, token_id = %result.token_id, tx_hash = %result.tx_hash, "Certificate minted");
        Ok(())
    }

    async fn handle_burn_fee(&self, job: &Job) -> Result<(), AppError> {
        let order = self.order_for_job(job).await?;
        let amount_wei = burn_amount_wei(order.total_price);

        let request = BurnRequest {
            amount_wei: amount_wei.to_string(),
            reason: format!("Fee burn for order {}", order.order_id),
            order_id: order.order_id.clone(),
            chain: job.chain.clone(),
        };

        let result = self.chain_client.burn_fee(&request).await?;

        self.store
            .complete_job(
                &job.id,
                &json!({
                    "amount_wei": amount_wei.to_string(),
                    "tx_hash": result.tx_hash,
                    "block_number": result.block_number,
                }),
            )
            .await?;

        info!(id = %job.id, amount_wei = %amount_wei, tx_hash = %result.tx_hash, "Fee burned");
        Ok(())
    }

    /// Resolve the order a MINT_NFT or BURN_FEE job refers to. A missing
    /// order is a data error, not a transient one.
    async fn order_for_job(&self, job: &Job) -> Result<OrderDetails, AppError> {
        let order_id = job.order_id.as_deref().ok_or_else(|| {
            AppError::Validation(ValidationError::InvalidField {
                field: "order_id".to_string(),
                message: format!("Job {} has no order id", job.id),
            })
        })?;

        self.store
            .get_order_details(order_id)
            .await?
            .ok_or_else(|| {
                AppError::Database(crate::domain::DatabaseError::NotFound(format!(
                    "order {} not found",
                    order_id
                )))
            })
    }

    /// Perform health check on all dependencies
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.store.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        let chain_health = match self.chain_client.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        HealthResponse::new(db_health, chain_health)
    }
}

/// 5% of the order value, converted from a decimal price to wei.
fn burn_amount_wei(total_price: f64) -> u128 {
    let amount = total_price * (BURN_FEE_PERCENT / 100.0);
    (amount * 1e18).round() as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burn_amount_is_five_percent_in_wei() {
        assert_eq!(burn_amount_wei(100.0), 5_000_000_000_000_000_000);
        assert_eq!(burn_amount_wei(1.0), 50_000_000_000_000_000);
        assert_eq!(burn_amount_wei(0.0), 0);
    }
}
