//! Sync job audit rows

use chrono::{DateTime, Utc};
use ledgersync_common::{SyncAction, TenantScope};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

/// Sync job (maps to sync_jobs table)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncJob {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub action: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub inserted: i64,
    pub updated: i64,
    pub ignored: i64,
    pub created_master: i64,
    pub errors: i64,
    pub linked: i64,
    pub reconciled: i64,
    /// Per-table counts and failures as JSON
    pub table_breakdown: serde_json::Value,
    pub error_message: Option<String>,
}

impl SyncJob {
    /// A new job in the running state
    pub fn start(scope: &TenantScope, action: SyncAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: scope.company_id,
            division_id: scope.division_id,
            action: action.as_str().to_string(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            inserted: 0,
            updated: 0,
            ignored: 0,
            created_master: 0,
            errors: 0,
            linked: 0,
            reconciled: 0,
            table_breakdown: serde_json::Value::Object(Default::default()),
            error_message: None,
        }
    }

    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.company_id, self.division_id)
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Sampled per-record detail of a sync job
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncJobDetail {
    pub id: Uuid,
    pub job_id: Uuid,
    pub table_name: String,
    pub record_id: String,
    pub action: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncJobDetail {
    pub fn new(
        job_id: Uuid,
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        action: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            table_name: table_name.into(),
            record_id: record_id.into(),
            action: action.into(),
            message,
            created_at: Utc::now(),
        }
    }
}
