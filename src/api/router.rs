//! HTTP router assembly.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;

use super::handlers::{
    ApiDoc, enqueue_job_handler, get_job_handler, health_check_handler, list_customer_jobs_handler,
    liveness_handler, process_jobs_handler, readiness_handler, verify_pending_handler,
};

/// Build the application router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs", post(enqueue_job_handler))
        .route("/jobs/process", post(process_jobs_handler))
        .route("/jobs/{id}", get(get_job_handler))
        .route("/customers/{customer_id}/jobs", get(list_customer_jobs_handler))
        .route("/pending-transactions/verify", post(verify_pending_handler))
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
