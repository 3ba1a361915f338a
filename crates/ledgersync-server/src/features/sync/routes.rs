//! Full sync routes

use axum::{extract::State, routing::post, Json, Router};
use ledgersync_common::SyncAction;

use crate::api::ApiResponse;
use crate::db::Store;
use crate::error::AppError;
use crate::features::AppState;
use crate::ingest::{SyncOutcome, SyncRequest};

pub fn sync_routes<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/sync", post(run_sync::<S>))
}

/// Run a sync action
///
/// POST /sync with `{"scope": {...}, "tables": [...], "action": "full_sync"}`
async fn run_sync<S: Store>(
    State(state): State<AppState<S>>,
    Json(request): Json<SyncRequest>,
) -> Result<ApiResponse<SyncOutcome>, AppError> {
    if request.action == SyncAction::FullSync && !request.tables.is_empty() && request.planned_tables().is_empty() {
        return Err(AppError::BadRequest(
            "None of the requested tables can be synced".to_string(),
        ));
    }

    tracing::info!(action = %request.action, scope = %request.scope, "Sync requested");
    let outcome = state.orchestrator().run(request).await?;
    Ok(ApiResponse::success(outcome))
}
