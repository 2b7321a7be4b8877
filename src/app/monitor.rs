//! Confirmation monitor for broadcast-but-unconfirmed transactions.
//!
//! Picks up where the submission path stopped waiting: polls receipts for
//! rows in `pending_transactions`, tracks confirmation depth, and finalizes
//! the owning job once the chain's safe depth is reached.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::domain::{
    AppError, ChainClient, ChainSettings, JobStore, JobType, MintCompletion, PendingTransaction,
};

/// Confirmation monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often to scan pending transactions
    pub poll_interval: std::time::Duration,
    /// Transactions younger than this are left alone; the submitting worker
    /// may still be waiting on them inline
    pub grace_minutes: i64,
    /// A transaction the chain has never seen after this long is dropped or
    /// replaced and will not appear later
    pub not_found_cutoff_hours: i64,
    pub enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(60),
            grace_minutes: 5,
            not_found_cutoff_hours: 2,
            enabled: true,
        }
    }
}

/// Resolves pending transactions to a terminal state
pub struct ConfirmationMonitor {
    store: Arc<dyn JobStore>,
    chain_client: Arc<dyn ChainClient>,
    settings: HashMap<String, ChainSettings>,
    config: MonitorConfig,
}

impl ConfirmationMonitor {
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        chain_client: Arc<dyn ChainClient>,
        settings: HashMap<String, ChainSettings>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            chain_client,
            settings,
            config,
        }
    }

    /// One verification sweep. Returns the number of transactions checked.
    ///
    /// Per-transaction failures are logged and skipped; a transaction that
    /// could not be checked this sweep is simply checked on the next one.
    #[instrument(skip(self))]
    pub async fn verify_pending_transactions(&self) -> Result<usize, AppError> {
        let older_than = Utc::now() - Duration::minutes(self.config.grace_minutes);
        let pending = self.store.due_pending_transactions(older_than).await?;

        if pending.is_empty() {
            return Ok(0);
        }

        info!(count = pending.len(), "Verifying pending transactions");

        let mut checked = 0;
        for tx in pending {
            if let Err(e) = self.verify_one(&tx).await {
                error!(id = %tx.id, tx_hash = %tx.tx_hash, error = ?e, "Verification attempt failed");
            }
            checked += 1;
        }

        Ok(checked)
    }

    async fn verify_one(&self, tx: &PendingTransaction) -> Result<(), AppError> {
        let receipt = self
            .chain_client
            .transaction_receipt(&tx.chain, &tx.tx_hash)
            .await?;

        let receipt = match receipt {
            Some(receipt) => receipt,
            None => {
                let cutoff = Duration::hours(self.config.not_found_cutoff_hours);
                if Utc::now() - tx.submitted_at > cutoff {
                    warn!(tx_hash = %tx.tx_hash, "Transaction never appeared on-chain, failing job");
                    let message = format!(
                        "Transaction {} not found on-chain after {} hours",
                        tx.tx_hash, self.config.not_found_cutoff_hours
                    );
                    self.store.mark_pending_failed(&tx.id, &message).await?;
                    self.store.fail_job(&tx.job_id, &message).await?;
                }
                return Ok(());
            }
        };

        if !receipt.success {
            warn!(tx_hash = %tx.tx_hash, "Transaction reverted on-chain, failing job");
            let message = format!("Transaction {} reverted on-chain", tx.tx_hash);
            self.store.mark_pending_failed(&tx.id, &message).await?;
            self.store.fail_job(&tx.job_id, &message).await?;
            return Ok(());
        }

        let current = self.chain_client.block_number(&tx.chain).await?;
        let confirmations = current.saturating_sub(receipt.block_number) + 1;

        self.store
            .update_pending_confirmations(&tx.id, confirmations as i32, receipt.block_number as i64)
            .await?;

        let required = self
            .settings
            .get(&tx.chain)
            .map(|s| s.safe_confirmations)
            .unwrap_or(30);

        if confirmations < required {
            return Ok(());
        }

        self.finalize(tx, &receipt).await?;
        self.store.mark_pending_confirmed(&tx.id).await?;
        info!(tx_hash = %tx.tx_hash, confirmations = confirmations, "Transaction confirmed");
        Ok(())
    }

    /// Complete the owning job now that the transaction is safely confirmed.
    async fn finalize(
        &self,
        tx: &PendingTransaction,
        receipt: &crate::domain::ReceiptSummary,
    ) -> Result<(), AppError> {
        let job = match self.store.get_job(&tx.job_id).await? {
            Some(job) => job,
            None => {
                warn!(job_id = %tx.job_id, "Pending transaction references a missing job");
                return Ok(());
            }
        };

        match job.job_type {
            JobType::MintNft => {
                // Token id and owner are re-derived from the receipt itself;
                // nothing from the crashed worker's memory is trusted.
                let minted = match &receipt.minted {
                    Some(minted) => minted,
                    None => {
                        let message = format!(
                            "Transaction {} succeeded but carries no NFTMinted event",
                            tx.tx_hash
                        );
                        self.store.mark_pending_failed(&tx.id, &message).await?;
                        return self.store.fail_job(&job.id, &message).await;
                    }
                };

                let order = self
                    .store
                    .get_order_details(job.order_id.as_deref().unwrap_or(""))
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(crate::domain::DatabaseError::NotFound(format!(
                            "order for job {} not found",
                            job.id
                        )))
                    })?;

                let chain_id = self
                    .settings
                    .get(&tx.chain)
                    .map(|s| s.chain_id as i64)
                    .unwrap_or(0);

                self.store
                    .complete_mint(&MintCompletion {
                        job_id: job.id.clone(),
                        customer_id: order.customer_id,
                        order_id: order.order_id,
                        product_id: order.product_id,
                        token_id: minted.token_id.clone(),
                        tx_hash: tx.tx_hash.clone(),
                        block_number: receipt.block_number as i64,
                        owner_address: minted.owner_address.clone(),
                        chain: tx.chain.clone(),
                        chain_id,
                    })
                    .await
            }
            _ => {
                self.store
                    .complete_job(
                        &job.id,
                        &serde_json::json!({
                            "tx_hash": tx.tx_hash,
                            "block_number": receipt.block_number,
                        }),
                    )
                    .await
            }
        }
    }
}

/// Spawn the periodic confirmation monitor.
/// Returns the task handle and a shutdown signal sender.
pub fn spawn_monitor(
    monitor: Arc<ConfirmationMonitor>,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let poll_interval = monitor.config.poll_interval;

    let handle = tokio::spawn(async move {
        info!(interval_secs = poll_interval.as_secs(), "Confirmation monitor started");
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = monitor.verify_pending_transactions().await {
                        error!(error = ?e, "Confirmation sweep failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Confirmation monitor shutting down");
                        break;
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}
