//! Sync job recording
//!
//! A [`JobRecorder`] owns the `sync_jobs` row of one full sync: it creates
//! the row in the running state, accumulates counts per table, samples
//! per-record details and writes the terminal state.

use ledgersync_common::{SyncAction, Table, TenantScope};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::linker::LinkReport;
use super::outcome::{OutcomeAction, RecordOutcome};
use super::reconciler::ReconcileReport;
use crate::db::{Store, StoreResult};
use crate::models::{SyncJob, SyncJobDetail};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Counts of one table within a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableBreakdown {
    pub status: TableStatus,
    pub inserted: i64,
    pub updated: i64,
    pub ignored: i64,
    pub created_master: i64,
    pub errors: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct JobRecorder<'a, S: Store> {
    store: &'a S,
    job: SyncJob,
    tables: BTreeMap<Table, TableBreakdown>,
    details: Vec<SyncJobDetail>,
    sample_limit: usize,
    dropped_details: usize,
}

impl<'a, S: Store> JobRecorder<'a, S> {
    /// Create the job row in the running state.
    pub async fn start(
        store: &'a S,
        scope: &TenantScope,
        action: SyncAction,
        sample_limit: usize,
    ) -> StoreResult<Self> {
        let job = SyncJob::start(scope, action);
        store.create_job(&job).await?;
        tracing::info!(job_id = %job.id, action = %action, scope = %scope, "Sync job started");

        Ok(Self {
            store,
            job,
            tables: BTreeMap::new(),
            details: Vec::new(),
            sample_limit,
            dropped_details: 0,
        })
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    pub fn table(&self, table: Table) -> Option<&TableBreakdown> {
        self.tables.get(&table)
    }

    /// Count one record outcome and keep a detail row while under the limit.
    pub fn record(&mut self, outcome: &RecordOutcome) {
        let entry = self.tables.entry(outcome.table).or_default();
        let (job_count, table_count) = match outcome.action {
            OutcomeAction::Inserted => (&mut self.job.inserted, &mut entry.inserted),
            OutcomeAction::Updated => (&mut self.job.updated, &mut entry.updated),
            OutcomeAction::Ignored => (&mut self.job.ignored, &mut entry.ignored),
            OutcomeAction::CreatedMaster => (&mut self.job.created_master, &mut entry.created_master),
            OutcomeAction::Error => (&mut self.job.errors, &mut entry.errors),
        };
        *job_count += 1;
        *table_count += 1;

        if outcome.action == OutcomeAction::Ignored {
            return;
        }
        if self.details.len() >= self.sample_limit {
            self.dropped_details += 1;
            return;
        }
        self.details.push(SyncJobDetail::new(
            self.job.id,
            outcome.table.as_str(),
            outcome.identifier.clone(),
            outcome.action.as_str(),
            outcome.message.clone(),
        ));
    }

    pub fn record_all<'o>(&mut self, outcomes: impl IntoIterator<Item = &'o RecordOutcome>) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    pub fn table_completed(&mut self, table: Table) {
        let entry = self.tables.entry(table).or_default();
        if entry.status != TableStatus::Failed {
            entry.status = TableStatus::Completed;
        }
    }

    pub fn table_failed(&mut self, table: Table, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(job_id = %self.job.id, table = %table, error = %message, "Table failed");
        let entry = self.tables.entry(table).or_default();
        entry.status = TableStatus::Failed;
        entry.error = Some(message);
    }

    pub fn passes(&mut self, link: Option<&LinkReport>, reconcile: Option<&ReconcileReport>) {
        if let Some(link) = link {
            self.job.linked = link.linked as i64;
        }
        if let Some(reconcile) = reconcile {
            self.job.reconciled = reconcile.reconciled as i64;
        }
    }

    fn breakdown_json(&self) -> serde_json::Value {
        let tables: BTreeMap<&str, &TableBreakdown> =
            self.tables.iter().map(|(table, counts)| (table.as_str(), counts)).collect();
        serde_json::to_value(tables).unwrap_or_default()
    }

    /// Persist current counts without ending the job.
    pub async fn checkpoint(&mut self) -> StoreResult<()> {
        self.job.table_breakdown = self.breakdown_json();
        self.store.update_job(&self.job).await
    }

    async fn close(mut self) -> StoreResult<SyncJob> {
        self.job.table_breakdown = self.breakdown_json();
        if !self.details.is_empty() {
            self.store.insert_job_details(&self.details).await?;
        }
        if self.dropped_details > 0 {
            tracing::debug!(job_id = %self.job.id, dropped = self.dropped_details, "Job details sampled");
        }
        self.store.update_job(&self.job).await?;
        Ok(self.job)
    }

    pub async fn complete(mut self) -> StoreResult<SyncJob> {
        self.job.complete();
        tracing::info!(
            job_id = %self.job.id,
            inserted = self.job.inserted,
            updated = self.job.updated,
            ignored = self.job.ignored,
            created_master = self.job.created_master,
            errors = self.job.errors,
            "Sync job completed"
        );
        self.close().await
    }

    pub async fn fail(mut self, message: impl Into<String>) -> StoreResult<SyncJob> {
        let message = message.into();
        tracing::error!(job_id = %self.job.id, error = %message, "Sync job failed");
        self.job.fail(message);
        self.close().await
    }
}
