//! Job routes
//!
//! Read-only routes for sync job status. Jobs are created by the sync
//! routes, never here.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use uuid::Uuid;

use super::queries::{get_job, list_jobs, ListJobsQuery, ListJobsResponse};
use crate::api::ApiResponse;
use crate::db::Store;
use crate::error::AppError;
use crate::features::AppState;
use crate::models::SyncJob;

pub fn jobs_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(list::<S>))
        .route("/:job_id", get(get_one::<S>))
}

/// List recent jobs of a tenant scope
///
/// GET /jobs?company_id=<uuid>&division_id=<uuid>&limit=50
async fn list<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<ApiResponse<ListJobsResponse>, AppError> {
    Ok(ApiResponse::success(list_jobs(state.store(), query).await?))
}

/// Get a specific job by ID
///
/// GET /jobs/:job_id
async fn get_one<S: Store>(
    State(state): State<AppState<S>>,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<SyncJob>, AppError> {
    Ok(ApiResponse::success(get_job(state.store(), job_id).await?))
}
