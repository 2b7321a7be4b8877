//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AppError, BlockchainError, DatabaseError, EnqueueJobRequest, ErrorDetail, ErrorResponse,
    HealthResponse, HealthStatus, Job, JobListParams,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "NFT Mint Relayer API",
        version = "0.1.0",
        description = "API for enqueueing and tracking background blockchain jobs",
        license(
            name = "MIT"
        )
    ),
    paths(
        enqueue_job_handler,
        get_job_handler,
        list_customer_jobs_handler,
        process_jobs_handler,
        verify_pending_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            Job,
            EnqueueJobRequest,
            crate::domain::JobType,
            crate::domain::JobStatus,
            JobListParams,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
        )
    ),
    tags(
        (name = "jobs", description = "Job queue endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Enqueue a new background job
///
/// Validates and persists the job, then returns immediately.
/// **Response indicates acceptance, not completion.**
/// Poll `GET /jobs/{id}` to track `status` progression:
/// - `PENDING` → queued for a worker
/// - `PROCESSING` → a worker is executing the job
/// - `VERIFYING` → transaction broadcast, awaiting safe confirmation depth
/// - `COMPLETED` / `FAILED` → terminal
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = EnqueueJobRequest,
    responses(
        (status = 200, description = "Job accepted for background processing", body = Job),
        (status = 400, description = "Validation error - invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
        (status = 503, description = "Service unavailable", body = ErrorResponse)
    )
)]
pub async fn enqueue_job_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EnqueueJobRequest>,
) -> Result<Json<Job>, AppError> {
    let job = state.service.enqueue_job(&payload).await?;
    Ok(Json(job))
}

/// Get a single job by ID
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job found", body = Job),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_job_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let job = state
        .service
        .get_job(&id)
        .await?
        .ok_or(AppError::Database(DatabaseError::NotFound(id)))?;
    Ok(Json(job))
}

/// List a customer's jobs, newest first
#[utoipa::path(
    get,
    path = "/customers/{customer_id}/jobs",
    tag = "jobs",
    params(
        ("customer_id" = String, Path, description = "Customer ID"),
        ("limit" = Option<i64>, Query, description = "Maximum number of jobs to return (1-100, default: 20)")
    ),
    responses(
        (status = 200, description = "List of jobs", body = Vec<Job>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_customer_jobs_handler(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Query(params): Query<JobListParams>,
) -> Result<Json<Vec<Job>>, AppError> {
    let limit = params.limit.clamp(1, 100);
    let jobs = state.service.list_customer_jobs(&customer_id, limit).await?;
    Ok(Json(jobs))
}

/// Trigger one job processing cycle
///
/// The background worker runs this on a schedule; this endpoint exists for
/// operational nudges and tests. Returns the number of jobs handled.
#[utoipa::path(
    post,
    path = "/jobs/process",
    tag = "jobs",
    responses(
        (status = 200, description = "Processing cycle complete"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn process_jobs_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let processed = state.service.process_jobs().await?;
    Ok(Json(serde_json::json!({ "processed": processed })))
}

/// Trigger one confirmation verification sweep
#[utoipa::path(
    post,
    path = "/pending-transactions/verify",
    tag = "jobs",
    responses(
        (status = 200, description = "Verification sweep complete"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn verify_pending_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let checked = state.monitor.verify_pending_transactions().await?;
    Ok(Json(serde_json::json!({ "checked": checked })))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, message) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    self.to_string(),
                ),
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", self.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    self.to_string(),
                ),
            },
            AppError::Blockchain(bc_err) => match bc_err {
                BlockchainError::Transient(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "blockchain_error",
                    self.to_string(),
                ),
                BlockchainError::InsufficientFunds => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_funds",
                    self.to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "blockchain_error",
                    self.to_string(),
                ),
            },
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
            AppError::NotSupported(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "not_supported",
                self.to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
