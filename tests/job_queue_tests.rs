//! Integration tests for the job queue processing cycle.

use std::sync::Arc;

use nft_mint_relayer::app::{JobService, JobServiceConfig};
use nft_mint_relayer::domain::{
    AppError, BlockchainError, ChainSettings, EnqueueJobRequest, JobStatus, JobStore, JobType,
    MintResult, OrderDetails,
};
use nft_mint_relayer::test_utils::{MockChainClient, MockJobStore};

fn test_order(order_id: &str, customer_id: &str, wallet: Option<&str>) -> OrderDetails {
    OrderDetails {
        order_id: order_id.to_string(),
        customer_id: customer_id.to_string(),
        product_id: "prod_1".to_string(),
        product_name: "Chronograph".to_string(),
        brand: "Maison".to_string(),
        total_price: 100.0,
        customer_wallet: wallet.map(str::to_string),
    }
}

fn build_service(
    store: Arc<MockJobStore>,
    chain: Arc<MockChainClient>,
) -> JobService {
    JobService::new(
        store,
        chain,
        ChainSettings::defaults(),
        JobServiceConfig {
            default_chain: "base-sepolia".to_string(),
            token_uri_host: "certs.example.com".to_string(),
        },
    )
}

fn mint_request(customer_id: &str, order_id: &str) -> EnqueueJobRequest {
    EnqueueJobRequest {
        job_type: JobType::MintNft,
        customer_id: customer_id.to_string(),
        order_id: Some(order_id.to_string()),
        chain: None,
    }
}

#[tokio::test]
async fn test_mint_job_completes_with_token_from_event() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_1", "cust_1", Some("0xabc")));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_1")).await.unwrap();

    let processed = service.process_jobs().await.unwrap();
    assert_eq!(processed, 1);

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result_data.unwrap();
    assert_eq!(result["token_id"], "42");

    // The completion procedure recorded the certificate mirror
    let completions = store.mint_completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].owner_address, "0xabc");
    assert_eq!(completions[0].chain_id, 84532);

    // Token URI is derived from the order id
    let requests = chain.mint_requests();
    assert_eq!(requests[0].token_uri, "https://certs.example.com/nft/order_1");
}

#[tokio::test]
async fn test_create_wallet_job_stores_address_only() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    let service = build_service(Arc::clone(&store), chain);

    let job = service
        .enqueue_job(&EnqueueJobRequest {
            job_type: JobType::CreateWallet,
            customer_id: "cust_7".to_string(),
            order_id: None,
            chain: None,
        })
        .await
        .unwrap();

    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let address = store.wallet_of("cust_7").unwrap();
    assert_eq!(job.result_data.unwrap()["address"], address);
    // The private key never lands in result_data
    assert!(!serde_json::to_string(&store.job(&job.id).unwrap()).unwrap().contains("private_key"));
}

#[tokio::test]
async fn test_burn_job_burns_five_percent_of_order_value() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_2", "cust_1", Some("0xabc")));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service
        .enqueue_job(&EnqueueJobRequest {
            job_type: JobType::BurnFee,
            customer_id: "cust_1".to_string(),
            order_id: Some("order_2".to_string()),
            chain: None,
        })
        .await
        .unwrap();

    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // 5% of 100.0, in wei
    let burns = chain.burn_requests();
    assert_eq!(burns[0].amount_wei, "5000000000000000000");
    assert!(burns[0].reason.contains("order_2"));
}

#[tokio::test]
async fn test_unconfirmed_mint_hands_off_to_monitor() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_3", "cust_1", Some("0xabc")));
    chain.push_mint_result(Err(AppError::Blockchain(BlockchainError::Unconfirmed {
        tx_hash: "0xdeadbeef".to_string(),
    })));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_3")).await.unwrap();

    service.process_jobs().await.unwrap();

    // Not failed, not retried: parked for the confirmation monitor
    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Verifying);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.result_data.unwrap()["tx_hash"], "0xdeadbeef");

    let pending = store.pending_for_job(&job.id);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tx_hash, "0xdeadbeef");
}

#[tokio::test]
async fn test_fatal_error_fails_without_consuming_retries() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_4", "cust_1", Some("0xabc")));
    chain.push_mint_result(Err(AppError::Blockchain(BlockchainError::InsufficientFunds)));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_4")).await.unwrap();

    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.unwrap().contains("insufficient funds"));
}

#[tokio::test]
async fn test_transient_error_reschedules_with_backoff() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_5", "cust_1", Some("0xabc")));
    chain.push_mint_result(Err(AppError::Blockchain(BlockchainError::Transient(
        "connection reset".to_string(),
    ))));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_5")).await.unwrap();

    let before = chrono::Utc::now();
    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    // First reschedule waits 2 minutes
    let next = job.next_retry_at.unwrap();
    assert!(next >= before + chrono::Duration::minutes(2));
    assert!(next <= chrono::Utc::now() + chrono::Duration::minutes(2));
    // And is not picked up again before it is due
    assert_eq!(service.process_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_terminates_job() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_6", "cust_1", Some("0xabc")));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_6")).await.unwrap();

    // Simulate a job already at the retry ceiling
    let mut seeded = store.job(&job.id).unwrap();
    seeded.retry_count = 3;
    store.insert_job(seeded);

    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("retry"));
    // Never reached the chain client
    assert!(chain.mint_requests().is_empty());
}

#[tokio::test]
async fn test_third_retryable_failure_records_final_attempt_count() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_11", "cust_1", Some("0xabc")));
    for _ in 0..3 {
        chain.push_mint_result(Err(AppError::Blockchain(BlockchainError::Transient(
            "connection reset".to_string(),
        ))));
    }

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_11")).await.unwrap();

    // First two failures reschedule; pull each one back to due
    for expected_retries in 1..=2 {
        service.process_jobs().await.unwrap();
        let mut rescheduled = store.job(&job.id).unwrap();
        assert_eq!(rescheduled.status, JobStatus::Pending);
        assert_eq!(rescheduled.retry_count, expected_retries);
        rescheduled.next_retry_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        store.insert_job(rescheduled);
    }

    // Third failure exhausts the budget
    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);
    assert!(job.error_message.unwrap().contains("connection reset"));
    assert_eq!(chain.mint_requests().len(), 3);
}

#[tokio::test]
async fn test_job_lock_is_mutually_exclusive() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_7", "cust_1", Some("0xabc")));

    let service = build_service(Arc::clone(&store), chain);
    let job = service.enqueue_job(&mint_request("cust_1", "order_7")).await.unwrap();

    assert!(store.try_acquire_job_lock(&job.id, "worker-a").await.unwrap());
    assert!(!store.try_acquire_job_lock(&job.id, "worker-b").await.unwrap());

    // The losing worker's cycle skips the job entirely
    assert_eq!(service.process_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_stale_locks_are_reclaimed() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_8", "cust_1", Some("0xabc")));

    let service = build_service(Arc::clone(&store), chain);
    let job = service.enqueue_job(&mint_request("cust_1", "order_8")).await.unwrap();

    // A worker that died mid-job an hour ago
    let mut stale = store.job(&job.id).unwrap();
    stale.status = JobStatus::Processing;
    stale.worker_id = Some("worker-dead".to_string());
    stale.locked_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
    store.insert_job(stale);

    // Same cycle reclaims the lock and completes the job
    let processed = service.process_jobs().await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_mint_without_customer_wallet_is_fatal() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_9", "cust_1", None));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_9")).await.unwrap();

    service.process_jobs().await.unwrap();

    let job = store.job(&job.id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert!(chain.mint_requests().is_empty());
}

#[tokio::test]
async fn test_enqueue_rejects_mint_without_order_id() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    let service = build_service(store, chain);

    let result = service
        .enqueue_job(&EnqueueJobRequest {
            job_type: JobType::MintNft,
            customer_id: "cust_1".to_string(),
            order_id: None,
            chain: None,
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_enqueue_rejects_unknown_chain() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    let service = build_service(store, chain);

    let result = service
        .enqueue_job(&EnqueueJobRequest {
            job_type: JobType::CreateWallet,
            customer_id: "cust_1".to_string(),
            order_id: None,
            chain: Some("dogechain".to_string()),
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_completed_jobs_survive_duplicate_completion() {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    store.insert_order(test_order("order_10", "cust_1", Some("0xabc")));
    chain.push_mint_result(Ok(MintResult {
        token_id: "7".to_string(),
        tx_hash: "0x77".to_string(),
        block_number: 100,
    }));

    let service = build_service(Arc::clone(&store), Arc::clone(&chain));
    let job = service.enqueue_job(&mint_request("cust_1", "order_10")).await.unwrap();

    service.process_jobs().await.unwrap();
    assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Completed);

    // A second cycle leaves the terminal job alone
    assert_eq!(service.process_jobs().await.unwrap(), 0);
    assert_eq!(store.job(&job.id).unwrap().result_data.unwrap()["token_id"], "7");
}
