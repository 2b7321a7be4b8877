//! Integration tests for the HTTP API.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use nft_mint_relayer::api::create_router;
use nft_mint_relayer::app::{AppState, JobServiceConfig, MonitorConfig};
use nft_mint_relayer::domain::{ChainSettings, Job, JobStatus, JobType, OrderDetails};
use nft_mint_relayer::test_utils::{MockChainClient, MockJobStore};

fn create_test_state() -> (Arc<AppState>, Arc<MockJobStore>, Arc<MockChainClient>) {
    let store = Arc::new(MockJobStore::new());
    let chain = Arc::new(MockChainClient::new());
    let state = Arc::new(AppState::new(
        Arc::clone(&store) as _,
        Arc::clone(&chain) as _,
        ChainSettings::defaults(),
        JobServiceConfig {
            default_chain: "base-sepolia".to_string(),
            token_uri_host: "certs.example.com".to_string(),
        },
        MonitorConfig::default(),
    ));
    (state, store, chain)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_enqueue_wallet_job_returns_pending_job() {
    let (state, _store, _chain) = create_test_state();
    let router = create_router(state);

    let response = router
        .oneshot(post_json(
            "/jobs",
            json!({ "job_type": "CREATE_WALLET", "customer_id": "cust_1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let job: Job = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(job.job_type, JobType::CreateWallet);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.customer_id, "cust_1");
    // Chain defaults when omitted
    assert_eq!(job.chain, "base-sepolia");
}

#[tokio::test]
async fn test_enqueue_mint_without_order_id_is_rejected() {
    let (state, store, _chain) = create_test_state();
    let router = create_router(state);

    let response = router
        .oneshot(post_json(
            "/jobs",
            json!({ "job_type": "MINT_NFT", "customer_id": "cust_1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "validation_error");
    assert!(store.jobs().is_empty());
}

#[tokio::test]
async fn test_enqueue_on_unknown_chain_is_rejected() {
    let (state, _store, _chain) = create_test_state();
    let router = create_router(state);

    let response = router
        .oneshot(post_json(
            "/jobs",
            json!({
                "job_type": "CREATE_WALLET",
                "customer_id": "cust_1",
                "chain": "dogechain"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_job_round_trip_and_missing_id() {
    let (state, store, _chain) = create_test_state();
    let router = create_router(state);

    store.insert_job(Job::new(
        "job_42".to_string(),
        JobType::CreateWallet,
        "cust_1".to_string(),
        "base-sepolia".to_string(),
    ));

    let response = router.clone().oneshot(get("/jobs/job_42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job: Job = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(job.id, "job_42");

    let response = router.oneshot(get("/jobs/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_customer_jobs_filters_by_customer() {
    let (state, store, _chain) = create_test_state();
    let router = create_router(state);

    store.insert_job(Job::new(
        "job_a".to_string(),
        JobType::CreateWallet,
        "cust_1".to_string(),
        "base-sepolia".to_string(),
    ));
    store.insert_job(Job::new(
        "job_b".to_string(),
        JobType::CreateWallet,
        "cust_2".to_string(),
        "base-sepolia".to_string(),
    ));

    let response = router.oneshot(get("/customers/cust_1/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let jobs: Vec<Job> = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "job_a");
}

#[tokio::test]
async fn test_process_endpoint_drains_due_jobs() {
    let (state, store, _chain) = create_test_state();
    let router = create_router(state);

    store.insert_order(OrderDetails {
        order_id: "order_1".to_string(),
        customer_id: "cust_1".to_string(),
        product_id: "prod_1".to_string(),
        product_name: "Chronograph".to_string(),
        brand: "Maison".to_string(),
        total_price: 100.0,
        customer_wallet: Some("0xabc".to_string()),
    });
    let mut job = Job::new(
        "job_1".to_string(),
        JobType::MintNft,
        "cust_1".to_string(),
        "base-sepolia".to_string(),
    );
    job.order_id = Some("order_1".to_string());
    store.insert_job(job);

    let response = router
        .oneshot(post_json("/jobs/process", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["processed"], 1);
    assert_eq!(store.job("job_1").unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_verify_endpoint_reports_checked_count() {
    let (state, _store, _chain) = create_test_state();
    let router = create_router(state);

    let response = router
        .oneshot(post_json("/pending-transactions/verify", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["checked"], 0);
}

#[tokio::test]
async fn test_health_reflects_store_state() {
    let (state, store, _chain) = create_test_state();
    let router = create_router(state);

    let response = router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");

    let response = router.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    store.set_healthy(false);
    let response = router.oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_liveness_always_ok() {
    let (state, store, _chain) = create_test_state();
    store.set_healthy(false);
    let router = create_router(state);

    let response = router.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
