//! Job queries

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Store, StoreError, StoreResult};
use crate::features::shared::TenantQuery;
use crate::models::SyncJob;

pub const DEFAULT_JOB_LIMIT: i64 = 50;
pub const MAX_JOB_LIMIT: i64 = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct ListJobsQuery {
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub limit: Option<i64>,
}

impl ListJobsQuery {
    pub fn tenant(&self) -> TenantQuery {
        TenantQuery {
            company_id: self.company_id,
            division_id: self.division_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<SyncJob>,
    pub limit: i64,
}

pub async fn list_jobs<S: Store>(store: &S, query: ListJobsQuery) -> StoreResult<ListJobsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT);
    let jobs = store.list_jobs(&query.tenant().scope(), limit).await?;
    Ok(ListJobsResponse { jobs, limit })
}

pub async fn get_job<S: Store>(store: &S, job_id: Uuid) -> StoreResult<SyncJob> {
    store
        .get_job(job_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Sync job '{}' not found", job_id)))
}
