//! PostgreSQL job store implementation.
//!
//! All cross-worker coordination happens here: lock acquisition, stale-lock
//! reclamation, and the status-guarded completion procedures are single
//! atomic statements (or one transaction), so concurrent workers and the
//! confirmation monitor never need in-process synchronization.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use tracing::{info, instrument};

use crate::domain::{
    AppError, DatabaseError, EnqueueJobRequest, Job, JobStatus, JobStore, MintCompletion,
    OrderDetails, PendingTransaction, PendingTxStatus,
};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: std::time::Duration,
    pub idle_timeout: std::time::Duration,
    pub max_lifetime: std::time::Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: std::time::Duration::from_secs(3),
            idle_timeout: std::time::Duration::from_secs(600),
            max_lifetime: std::time::Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL job store with connection pooling
pub struct PostgresJobStore {
    pool: PgPool,
}

const JOB_COLUMNS: &str = r#"id, job_type, status, customer_id, order_id, chain,
       retry_count, error_message, next_retry_at, worker_id, locked_at,
       result_data, created_at, completed_at"#;

impl PostgresJobStore {
    /// Create a new job store with custom pool configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new job store with default pool configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Parse a database row into a Job
    fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, AppError> {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");

        Ok(Job {
            id: row.get("id"),
            job_type: job_type.parse().map_err(|e: String| {
                AppError::Database(DatabaseError::Query(e))
            })?,
            status: status.parse().unwrap_or(JobStatus::Pending),
            customer_id: row.get("customer_id"),
            order_id: row.get("order_id"),
            chain: row.get("chain"),
            retry_count: row.get("retry_count"),
            error_message: row.get("error_message"),
            next_retry_at: row.get("next_retry_at"),
            worker_id: row.get("worker_id"),
            locked_at: row.get("locked_at"),
            result_data: row.get("result_data"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        })
    }

    /// Parse a database row into a PendingTransaction
    fn row_to_pending_transaction(
        row: &sqlx::postgres::PgRow,
    ) -> Result<PendingTransaction, AppError> {
        let status: String = row.get("status");

        Ok(PendingTransaction {
            id: row.get("id"),
            job_id: row.get("job_id"),
            tx_hash: row.get("tx_hash"),
            chain: row.get("chain"),
            status: status.parse().unwrap_or(PendingTxStatus::Pending),
            confirmations: row.get("confirmations"),
            block_number: row.get("block_number"),
            submitted_at: row.get("submitted_at"),
            confirmed_at: row.get("confirmed_at"),
            error_message: row.get("error_message"),
        })
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(job_type = %request.job_type, customer_id = %request.customer_id))]
    async fn enqueue_job(
        &self,
        request: &EnqueueJobRequest,
        chain: &str,
    ) -> Result<Job, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, customer_id, order_id, chain,
                              retry_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&id)
        .bind(request.job_type.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(&request.customer_id)
        .bind(&request.order_id)
        .bind(chain)
        .bind(0i32)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        let mut job = Job::new(
            id,
            request.job_type,
            request.customer_id.clone(),
            chain.to_string(),
        );
        job.order_id = request.order_id.clone();
        job.created_at = now;
        Ok(job)
    }

    #[instrument(skip(self))]
    async fn get_job(&self, id: &str) -> Result<Option<Job>, AppError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_customer_jobs(
        &self,
        customer_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, AppError> {
        let limit = limit.clamp(1, 100);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn due_jobs(&self, limit: i64) -> Result<Vec<Job>, AppError> {
        let now = Utc::now();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'PENDING'
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn try_acquire_job_lock(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        // Conditional update is the lock: zero rows affected means another
        // worker won the race.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PROCESSING', worker_id = $1, locked_at = $2
            WHERE id = $3
              AND status = 'PENDING'
              AND worker_id IS NULL
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn release_stale_job_locks(&self, stale_after: Duration) -> Result<u64, AppError> {
        let cutoff = Utc::now() - stale_after;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PENDING', worker_id = NULL, locked_at = NULL
            WHERE status = 'PROCESSING'
              AND locked_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, result))]
    async fn complete_job(
        &self,
        job_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'COMPLETED', result_data = $1, completed_at = $2,
                worker_id = NULL, locked_at = NULL, error_message = NULL
            WHERE id = $3
              AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(result)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', error_message = $1, completed_at = $2,
                worker_id = NULL, locked_at = NULL
            WHERE id = $3
              AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_job_exhausted(
        &self,
        job_id: &str,
        error: &str,
        retry_count: i32,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', error_message = $1, retry_count = $2,
                completed_at = $3, worker_id = NULL, locked_at = NULL
            WHERE id = $4
              AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(error)
        .bind(retry_count)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn reschedule_job(
        &self,
        job_id: &str,
        error: &str,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PENDING', error_message = $1, retry_count = $2,
                next_retry_at = $3, worker_id = NULL, locked_at = NULL
            WHERE id = $4
            "#,
        )
        .bind(error)
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_job_verifying(&self, job_id: &str, tx_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'VERIFYING',
                result_data = jsonb_build_object('tx_hash', $1::text),
                worker_id = NULL, locked_at = NULL
            WHERE id = $2
            "#,
        )
        .bind(tx_hash)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self, address))]
    async fn set_customer_wallet(
        &self,
        customer_id: &str,
        address: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET wallet_address = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(address)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "customer {} not found",
                customer_id
            ))));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_order_details(&self, order_id: &str) -> Result<Option<OrderDetails>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT o.id AS order_id, o.customer_id, o.product_id,
                   o.product_name, o.brand, o.total_price,
                   c.wallet_address AS customer_wallet
            FROM orders o
            JOIN customers c ON c.id = o.customer_id
            WHERE o.id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(row.map(|row| OrderDetails {
            order_id: row.get("order_id"),
            customer_id: row.get("customer_id"),
            product_id: row.get("product_id"),
            product_name: row.get("product_name"),
            brand: row.get("brand"),
            total_price: row.get("total_price"),
            customer_wallet: row.get("customer_wallet"),
        }))
    }

    #[instrument(skip(self))]
    async fn insert_pending_transaction(
        &self,
        job_id: &str,
        tx_hash: &str,
        chain: &str,
    ) -> Result<(), AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        // Idempotent on tx_hash; a duplicate insert from a crashed-and-
        // recovered worker is a no-op.
        sqlx::query(
            r#"
            INSERT INTO pending_transactions (id, job_id, tx_hash, chain, status,
                                              confirmations, submitted_at)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(job_id)
        .bind(tx_hash)
        .bind(chain)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn due_pending_transactions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PendingTransaction>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, tx_hash, chain, status, confirmations,
                   block_number, submitted_at, confirmed_at, error_message
            FROM pending_transactions
            WHERE status = 'pending'
              AND submitted_at < $1
            ORDER BY submitted_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        rows.iter().map(Self::row_to_pending_transaction).collect()
    }

    #[instrument(skip(self))]
    async fn update_pending_confirmations(
        &self,
        id: &str,
        confirmations: i32,
        block_number: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_transactions
            SET confirmations = GREATEST(confirmations, $1), block_number = $2
            WHERE id = $3
              AND status = 'pending'
            "#,
        )
        .bind(confirmations)
        .bind(block_number)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_pending_confirmed(&self, id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE pending_transactions
            SET status = 'confirmed', confirmed_at = $1
            WHERE id = $2
              AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_pending_failed(&self, id: &str, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_transactions
            SET status = 'failed', error_message = $1
            WHERE id = $2
              AND status = 'pending'
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self, completion), fields(job_id = %completion.job_id, order_id = %completion.order_id))]
    async fn complete_mint(&self, completion: &MintCompletion) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;

        let now = Utc::now();
        let result_data = serde_json::json!({
            "token_id": completion.token_id,
            "tx_hash": completion.tx_hash,
            "block_number": completion.block_number,
        });

        // Status guard makes this idempotent across the worker and the
        // monitor; only the first caller past the guard writes anything.
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'COMPLETED', result_data = $1, completed_at = $2,
                worker_id = NULL, locked_at = NULL, error_message = NULL
            WHERE id = $3
              AND status NOT IN ('COMPLETED', 'FAILED')
            "#,
        )
        .bind(&result_data)
        .bind(now)
        .bind(&completion.job_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO certificates (id, order_id, customer_id, product_id,
                                      token_id, tx_hash, block_number,
                                      owner_address, chain, chain_id, minted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&completion.order_id)
        .bind(&completion.customer_id)
        .bind(&completion.product_id)
        .bind(&completion.token_id)
        .bind(&completion.tx_hash)
        .bind(completion.block_number)
        .bind(&completion.owner_address)
        .bind(&completion.chain)
        .bind(completion.chain_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        sqlx::query(
            r#"
            UPDATE orders
            SET nft_token_id = $1, nft_tx_hash = $2, nft_minted_at = $3
            WHERE id = $4
            "#,
        )
        .bind(&completion.token_id)
        .bind(&completion.tx_hash)
        .bind(now)
        .bind(&completion.order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }
}
