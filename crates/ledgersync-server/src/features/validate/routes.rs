//! Validation routes

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};

use crate::api::ApiResponse;
use crate::db::Store;
use crate::error::AppError;
use crate::features::shared::TenantQuery;
use crate::features::AppState;
use crate::ingest::{IntegrityValidator, ValidationReport};

pub fn validate_routes<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/validate", get(validate::<S>))
}

/// Audit one tenant scope
///
/// GET /validate?company_id=<uuid>&division_id=<uuid>
async fn validate<S: Store>(
    State(state): State<AppState<S>>,
    Query(tenant): Query<TenantQuery>,
) -> Result<ApiResponse<ValidationReport>, AppError> {
    let mut validator = IntegrityValidator::new(state.store());
    let report = validator.validate(&tenant.scope(), &state.shutdown).await;
    Ok(ApiResponse::success(report))
}
