//! Ingestion routes
//!
//! `POST /ingest?company_id=&division_id=&live=` with the raw export as
//! the request body.

use axum::{
    extract::{Query, State},
    routing::post,
    Router,
};
use ledgersync_common::TenantScope;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::ApiResponse;
use crate::db::Store;
use crate::error::AppError;
use crate::features::AppState;
use crate::ingest::{IngestReport, OutcomeAction};

#[derive(Debug, Clone, Deserialize)]
pub struct IngestParams {
    pub company_id: Uuid,
    pub division_id: Uuid,
    /// Run the linker and reconciler after the upserts
    #[serde(default)]
    pub live: bool,
}

impl IngestParams {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.company_id, self.division_id)
    }
}

pub fn ingest_routes<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/ingest", post(ingest::<S>))
}

/// Ingest one payload
///
/// POST /ingest?company_id=<uuid>&division_id=<uuid>&live=true
async fn ingest<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<IngestParams>,
    body: String,
) -> Result<ApiResponse<IngestReport>, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("Request body must contain an export payload".to_string()));
    }

    let report = state.pipeline.ingest(&body, params.scope(), params.live).await;
    let meta = json!({
        "records": report.outcomes.len(),
        "errors": report.count(OutcomeAction::Error),
        "live": params.live,
    });
    Ok(ApiResponse::success_with_meta(report, meta))
}
