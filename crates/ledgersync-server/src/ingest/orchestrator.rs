//! Full-sync orchestration
//!
//! Pulls every requested table from the source system in dependency order,
//! writes it through the master resolver or the upsert engine, then runs
//! the linker and reconciler. Each run is recorded as a sync job.
//!
//! Failures are contained at the narrowest level: a bad record becomes an
//! `error` outcome, a table whose export cannot be fetched is marked failed
//! in the job breakdown and the next table proceeds.

use anyhow::Context;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use ledgersync_common::{SyncAction, Table, TenantScope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::extractor::Fragment;
use super::jobs::JobRecorder;
use super::linker::LinkReport;
use super::master_blocks::{extract_masters, MasterBlock};
use super::masters::MasterResolver;
use super::outcome::RecordOutcome;
use super::pipeline::IngestPipeline;
use super::reconciler::ReconcileReport;
use super::source::{SourceClient, SourceError};
use super::transactions::{extract_vouchers, ParsedVoucher, VoucherBlock};
use super::upsert::{upsert_batch, BatchReport};
use crate::db::{RecordStore, Store};
use crate::models::{Record, SyncJob};

/// What to sync and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub scope: TenantScope,
    /// Tables to pull; empty means every syncable table
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub action: SyncAction,
}

impl SyncRequest {
    pub fn full_sync(scope: TenantScope) -> Self {
        Self {
            scope,
            tables: Vec::new(),
            action: SyncAction::FullSync,
        }
    }

    pub fn with_tables(mut self, tables: impl IntoIterator<Item = Table>) -> Self {
        self.tables = tables.into_iter().collect();
        self
    }

    pub fn with_action(mut self, action: SyncAction) -> Self {
        self.action = action;
        self
    }

    /// Requested tables that can be synced, deduplicated, in dependency order.
    pub fn planned_tables(&self) -> Vec<Table> {
        if self.tables.is_empty() {
            return Table::syncable().collect();
        }
        Table::syncable().filter(|t| self.tables.contains(t)).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullSyncReport {
    pub job: SyncJob,
    pub tables: Vec<Table>,
    pub failed_tables: Vec<Table>,
    pub link: Option<LinkReport>,
    pub reconcile: Option<ReconcileReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub source: ComponentHealth,
    pub store: ComponentHealth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMetadata {
    pub table: Table,
    /// Position in the dependency order
    pub order: usize,
    pub syncable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataReport {
    pub scope: TenantScope,
    pub tables: Vec<TableMetadata>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncOutcome {
    FullSync(FullSyncReport),
    HealthCheck(HealthReport),
    Metadata(MetadataReport),
}

/// The voucher export, fetched at most once per run.
#[derive(Default)]
struct VoucherExport {
    payload: Option<Result<String, String>>,
}

impl VoucherExport {
    async fn get(
        &mut self,
        source: &dyn SourceClient,
        scope: &TenantScope,
        table: Table,
    ) -> Result<&str, String> {
        if self.payload.is_none() {
            let fetched = source.fetch_table(scope, table).await.map_err(|e| e.to_string());
            self.payload = Some(fetched);
        }
        match &self.payload {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(e)) => Err(e.clone()),
            None => Err("voucher export not fetched".to_string()),
        }
    }
}

pub struct FullSyncOrchestrator<S: Store> {
    pipeline: IngestPipeline<S>,
    source: Arc<dyn SourceClient>,
    cancel: CancellationToken,
}

impl<S: Store> FullSyncOrchestrator<S> {
    pub fn new(pipeline: IngestPipeline<S>, source: Arc<dyn SourceClient>) -> Self {
        Self {
            pipeline,
            source,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.pipeline = self.pipeline.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &S {
        self.pipeline.store()
    }

    pub async fn run(&self, request: SyncRequest) -> anyhow::Result<SyncOutcome> {
        match request.action {
            SyncAction::FullSync => {
                let tables = request.planned_tables();
                self.full_sync(&request.scope, &tables)
                    .await
                    .map(SyncOutcome::FullSync)
            }
            SyncAction::HealthCheck => Ok(SyncOutcome::HealthCheck(self.health_check().await)),
            SyncAction::Metadata => Ok(SyncOutcome::Metadata(self.metadata(&request.scope).await)),
        }
    }

    /// Sync `tables` in the given order and record the run as a job.
    ///
    /// Returns `Err` only when the job row itself cannot be written. The job
    /// fails when the run is cancelled or when every table failed.
    #[tracing::instrument(skip(self, scope, tables), fields(scope = %scope, tables = tables.len()))]
    pub async fn full_sync(&self, scope: &TenantScope, tables: &[Table]) -> anyhow::Result<FullSyncReport> {
        let store = self.pipeline.store();
        let config = self.pipeline.config();
        let mut recorder = JobRecorder::start(store, scope, SyncAction::FullSync, config.detail_sample_limit)
            .await
            .context("Failed to create sync job")?;

        let mut vouchers = VoucherExport::default();
        let mut failed_tables = Vec::new();
        let mut cancelled = false;

        for &table in tables {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.sync_table(scope, table, &mut vouchers).await {
                Ok(outcomes) => {
                    tracing::info!(table = %table, records = outcomes.len(), "Table synced");
                    recorder.record_all(&outcomes);
                    recorder.table_completed(table);
                }
                Err(message) => {
                    recorder.table_failed(table, message);
                    failed_tables.push(table);
                }
            }

            if let Err(e) = recorder.checkpoint().await {
                tracing::warn!(job_id = %recorder.job_id(), error = %e, "Job checkpoint failed");
            }
        }

        let (link, reconcile) = if cancelled {
            (None, None)
        } else {
            self.pipeline.run_passes(scope).await
        };
        recorder.passes(link.as_ref(), reconcile.as_ref());

        let all_failed = !tables.is_empty() && failed_tables.len() == tables.len();
        let job = if cancelled {
            recorder.fail("sync cancelled").await
        } else if all_failed {
            recorder.fail("every table failed").await
        } else {
            recorder.complete().await
        }
        .context("Failed to record sync job result")?;

        Ok(FullSyncReport {
            job,
            tables: tables.to_vec(),
            failed_tables,
            link,
            reconcile,
        })
    }

    async fn sync_table(
        &self,
        scope: &TenantScope,
        table: Table,
        vouchers: &mut VoucherExport,
    ) -> Result<Vec<RecordOutcome>, String> {
        if let Some(kind) = table.master_kind() {
            let payload = self
                .source
                .fetch_table(scope, table)
                .await
                .map_err(|e: SourceError| e.to_string())?;
            let fragment = Fragment::new(&payload);
            let blocks: Vec<_> = extract_masters(&fragment)
                .into_iter()
                .filter(|block| block.kind() == kind)
                .collect();
            return Ok(self.resolve_master_blocks(scope, blocks).await);
        }

        let payload = vouchers.get(self.source.as_ref(), scope, table).await?;
        let fragment = Fragment::new(payload);
        match table {
            Table::Vouchers => Ok(self.sync_vouchers(scope, &fragment).await),
            Table::LedgerEntries => {
                let rows: Vec<_> = parsed_vouchers(&fragment)
                    .flat_map(|v| v.into_rows(scope, false).ledger_entries)
                    .collect();
                Ok(self.write_batch(&rows, "ledger_entry").await)
            }
            Table::InventoryEntries => {
                let rows: Vec<_> = parsed_vouchers(&fragment)
                    .flat_map(|v| v.into_rows(scope, false).inventory_entries)
                    .collect();
                Ok(self.write_batch(&rows, "inventory_entry").await)
            }
            other => Err(SourceError::Unsupported(other).to_string()),
        }
    }

    async fn resolve_master_blocks(
        &self,
        scope: &TenantScope,
        blocks: Vec<MasterBlock>,
    ) -> Vec<RecordOutcome> {
        let resolver = MasterResolver::new(self.pipeline.store(), *scope);
        let resolver = &resolver;
        stream::iter(blocks)
            .map(|block| async move {
                match block.resolve(resolver).await {
                    Ok(resolution) => RecordOutcome::master(&resolution),
                    Err(e) => RecordOutcome::master_error(block.kind(), block.name(), e),
                }
            })
            .buffer_unordered(self.pipeline.config().concurrency.max(1))
            .collect()
            .await
    }

    /// Resolve voucher references, then write the voucher rows. Entries are
    /// written by their own tables and linked afterwards.
    async fn sync_vouchers(&self, scope: &TenantScope, payload: &Fragment<'_>) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::new();
        let mut parsed = Vec::new();
        for block in extract_vouchers(payload) {
            match block {
                VoucherBlock::Parsed(voucher) => parsed.push(*voucher),
                VoucherBlock::Skipped(skipped) => outcomes.push(RecordOutcome::error(
                    Table::Vouchers,
                    skipped.voucher_number.unwrap_or_else(|| format!("#{}", skipped.index)),
                    "voucher",
                    skipped.reason,
                )),
            }
        }

        let resolved: Vec<Vec<RecordOutcome>> = stream::iter(parsed.iter())
            .map(|voucher| self.pipeline.resolve_references(voucher, *scope))
            .buffer_unordered(self.pipeline.config().concurrency.max(1))
            .collect()
            .boxed()
            .await;
        outcomes.extend(resolved.into_iter().flatten());

        let rows: Vec<_> = parsed
            .into_iter()
            .map(|v| v.into_rows(scope, false).voucher)
            .collect();
        outcomes.extend(self.write_batch(&rows, "voucher").await);
        outcomes
    }

    async fn write_batch<R>(&self, rows: &[R], kind: &str) -> Vec<RecordOutcome>
    where
        R: Record,
        S: RecordStore<R>,
    {
        let config = self.pipeline.config();
        let report = upsert_batch(
            self.pipeline.store(),
            rows,
            config.store_batch_size,
            config.concurrency,
            config.store_batch_timeout(),
        )
        .await;
        batch_outcomes(R::TABLE, kind, report)
    }

    /// Ping the source and the store.
    pub async fn health_check(&self) -> HealthReport {
        let source = ComponentHealth::from_result(self.source.ping().await);
        let store = ComponentHealth::from_result(self.pipeline.store().ping().await);
        let report = HealthReport {
            healthy: source.healthy && store.healthy,
            source,
            store,
        };
        tracing::info!(healthy = report.healthy, "Health check finished");
        report
    }

    /// Dependency order and row counts of every table in a scope.
    pub async fn metadata(&self, scope: &TenantScope) -> MetadataReport {
        let store = self.pipeline.store();
        let mut tables = Vec::with_capacity(Table::DEPENDENCY_ORDER.len());
        for (order, table) in Table::DEPENDENCY_ORDER.into_iter().enumerate() {
            let (rows, error) = match store.count(scope, table).await {
                Ok(rows) => (Some(rows), None),
                Err(e) => (None, Some(e.to_string())),
            };
            tables.push(TableMetadata {
                table,
                order,
                syncable: !table.is_tenant_root(),
                rows,
                error,
            });
        }
        MetadataReport { scope: *scope, tables }
    }
}

fn parsed_vouchers<'a>(payload: &'a Fragment<'a>) -> impl Iterator<Item = ParsedVoucher> + 'a {
    extract_vouchers(payload).filter_map(|block| match block {
        VoucherBlock::Parsed(voucher) => Some(*voucher),
        VoucherBlock::Skipped(_) => None,
    })
}

fn batch_outcomes(table: Table, kind: &str, report: BatchReport) -> Vec<RecordOutcome> {
    report
        .items
        .into_iter()
        .map(|item| match item.result {
            Ok(action) => RecordOutcome::new(table, action.into(), item.identifier, kind),
            Err(e) => RecordOutcome::error(table, item.identifier, kind, e),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::{self, MemoryStore};
    use crate::ingest::config::SyncConfig;
    use crate::ingest::source::StaticSource;
    use crate::models::{JobStatus, LedgerEntry, Voucher};
    use uuid::Uuid;

    const LEDGERS: &str = r#"<ENVELOPE>
<LEDGER NAME="Cash"><PARENT>Cash-in-Hand</PARENT></LEDGER>
<LEDGER NAME="Sales"><PARENT>Sales Accounts</PARENT></LEDGER>
</ENVELOPE>"#;

    const VOUCHERS: &str = r#"<ENVELOPE>
<VOUCHER VCHTYPE="Sales">
  <GUID>g-1</GUID>
  <DATE>20240401</DATE>
  <VOUCHERNUMBER>INV-001</VOUCHERNUMBER>
  <ALLLEDGERENTRIES.LIST>
    <LEDGERNAME>Cash</LEDGERNAME>
    <ISDEEMEDPOSITIVE>Yes</ISDEEMEDPOSITIVE>
    <AMOUNT>-500.00</AMOUNT>
  </ALLLEDGERENTRIES.LIST>
  <ALLLEDGERENTRIES.LIST>
    <LEDGERNAME>Sales</LEDGERNAME>
    <ISDEEMEDPOSITIVE>No</ISDEEMEDPOSITIVE>
    <AMOUNT>500.00</AMOUNT>
  </ALLLEDGERENTRIES.LIST>
</VOUCHER>
</ENVELOPE>"#;

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    fn orchestrator(source: StaticSource) -> FullSyncOrchestrator<MemoryStore> {
        let pipeline = IngestPipeline::new(Arc::new(MemoryStore::new()), SyncConfig::default());
        FullSyncOrchestrator::new(pipeline, Arc::new(source))
    }

    #[test]
    fn test_planned_tables() {
        let request = SyncRequest::full_sync(scope())
            .with_tables([Table::LedgerEntries, Table::Companies, Table::Ledgers, Table::Ledgers]);
        assert_eq!(request.planned_tables(), vec![Table::Ledgers, Table::LedgerEntries]);
        assert_eq!(SyncRequest::full_sync(scope()).planned_tables().len(), 11);
    }

    #[tokio::test]
    async fn test_full_sync_links_and_reconciles() {
        let source = StaticSource::new()
            .with_table(Table::Ledgers, LEDGERS)
            .with_table(Table::Vouchers, VOUCHERS);
        let orchestrator = orchestrator(source);
        let tables = [Table::Ledgers, Table::Vouchers, Table::LedgerEntries];

        let report = orchestrator.full_sync(&scope(), &tables).await.unwrap();

        assert_eq!(report.job.status, JobStatus::Completed);
        assert!(report.failed_tables.is_empty());
        assert_eq!(report.job.created_master, 3, "two ledgers plus the Sales voucher type");
        assert_eq!(report.job.inserted, 3);
        assert_eq!(report.link.unwrap().linked, 2);
        assert_eq!(report.job.reconciled, 1);

        let store = orchestrator.pipeline.store();
        let entries: Vec<LedgerEntry> = db::list(store, &scope()).await.unwrap();
        let voucher: Voucher = db::get(store, ledgersync_common::identity::voucher_id(&scope(), "g-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(entries.iter().all(|e| e.voucher_id == Some(voucher.id)));
        assert_eq!(voucher.total_amount, Some(rust_decimal::Decimal::from(1000)));
    }

    #[tokio::test]
    async fn test_voucher_export_fetched_once() {
        let source = Arc::new(StaticSource::new().with_table(Table::Vouchers, VOUCHERS));
        let pipeline = IngestPipeline::new(Arc::new(MemoryStore::new()), SyncConfig::default());
        let orchestrator = FullSyncOrchestrator::new(pipeline, source.clone());

        orchestrator
            .full_sync(&scope(), &[Table::Vouchers, Table::LedgerEntries, Table::InventoryEntries])
            .await
            .unwrap();
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_table_failure_is_contained() {
        let source = StaticSource::new().with_table(Table::Vouchers, VOUCHERS);
        let orchestrator = orchestrator(source);

        let report = orchestrator
            .full_sync(&scope(), &[Table::Units, Table::Vouchers])
            .await
            .unwrap();

        assert_eq!(report.job.status, JobStatus::Completed);
        assert_eq!(report.failed_tables, vec![Table::Units]);
        assert_eq!(report.job.table_breakdown["units"]["status"], "failed");
        assert_eq!(report.job.table_breakdown["vouchers"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_all_tables_failed_fails_job() {
        let orchestrator = orchestrator(StaticSource::new());
        let report = orchestrator
            .full_sync(&scope(), &[Table::Ledgers, Table::Vouchers])
            .await
            .unwrap();

        assert_eq!(report.job.status, JobStatus::Failed);
        assert_eq!(report.job.error_message.as_deref(), Some("every table failed"));
        let stored = orchestrator.pipeline.store().get_job(report.job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_sync_fails_job() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = orchestrator(StaticSource::new()).with_cancellation(cancel);

        let report = orchestrator.full_sync(&scope(), &[Table::Ledgers]).await.unwrap();
        assert_eq!(report.job.status, JobStatus::Failed);
        assert!(report.link.is_none());
    }

    #[tokio::test]
    async fn test_health_check_and_metadata() {
        let orchestrator = orchestrator(StaticSource::new().offline());

        let SyncOutcome::HealthCheck(health) = orchestrator
            .run(SyncRequest::full_sync(scope()).with_action(SyncAction::HealthCheck))
            .await
            .unwrap()
        else {
            panic!("expected health report");
        };
        assert!(!health.healthy);
        assert!(health.store.healthy);
        assert!(health.source.error.is_some());

        let metadata = orchestrator.metadata(&scope()).await;
        assert_eq!(metadata.tables.len(), 13);
        assert_eq!(metadata.tables[0].table, Table::Companies);
        assert!(!metadata.tables[0].syncable);
        assert_eq!(metadata.tables[12].rows, Some(0));
    }
}
