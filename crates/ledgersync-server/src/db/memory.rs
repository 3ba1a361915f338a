//! In-memory store
//!
//! Rows are kept as JSON documents keyed by table and id, mirroring the
//! conditional-write semantics of [`super::PgStore`]. Used by tests and by
//! the CLI's `--dry-run` mode.

use async_trait::async_trait;
use ledgersync_common::{Table, TenantScope};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{RecordStore, Store, StoreError, StoreResult, UnlinkedChild, VoucherRef};
use crate::models::{
    InventoryEntry, LedgerEntry, Record, SyncJob, SyncJobDetail, Voucher, VoucherAmounts,
};

#[derive(Default)]
struct State {
    tables: HashMap<Table, BTreeMap<Uuid, Value>>,
    jobs: BTreeMap<Uuid, SyncJob>,
    details: Vec<SyncJobDetail>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing: HashSet<Table>,
    unreadable: HashSet<Table>,
    slow: HashMap<Table, Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write into `table`.
    pub fn fail_writes_to(mut self, table: Table) -> Self {
        self.failing.insert(table);
        self
    }

    /// Delay every row write into `table` by `delay`.
    pub fn slow_writes_to(mut self, table: Table, delay: Duration) -> Self {
        self.slow.insert(table, delay);
        self
    }

    /// Fail every read from `table`.
    pub fn fail_reads_from(mut self, table: Table) -> Self {
        self.unreadable.insert(table);
        self
    }

    /// Sampled details recorded for a job.
    pub fn job_details(&self, job_id: Uuid) -> StoreResult<Vec<SyncJobDetail>> {
        Ok(self
            .lock()?
            .details
            .iter()
            .filter(|d| d.job_id == job_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn check_writable(&self, table: Table) -> StoreResult<()> {
        if self.failing.contains(&table) {
            return Err(StoreError::Rejected {
                table,
                message: "writes disabled".to_string(),
            });
        }
        Ok(())
    }

    async fn pause_before_write(&self, table: Table) {
        if let Some(delay) = self.slow.get(&table) {
            tokio::time::sleep(*delay).await;
        }
    }

    fn check_readable(&self, table: Table) -> StoreResult<()> {
        if self.unreadable.contains(&table) {
            return Err(StoreError::Rejected {
                table,
                message: "reads disabled".to_string(),
            });
        }
        Ok(())
    }

    fn rows<R: Record>(state: &State) -> StoreResult<Vec<R>> {
        state
            .tables
            .get(&R::TABLE)
            .map(|rows| {
                rows.values()
                    .map(|v| serde_json::from_value(v.clone()).map_err(StoreError::from))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn scoped_rows<R: Record>(&self, scope: &TenantScope) -> StoreResult<Vec<R>> {
        self.check_readable(R::TABLE)?;
        let state = self.lock()?;
        Ok(Self::rows::<R>(&state)?
            .into_iter()
            .filter(|r| r.in_scope(scope))
            .collect())
    }

    fn put<R: Record>(state: &mut State, record: &R) -> StoreResult<()> {
        let value = serde_json::to_value(record)?;
        state
            .tables
            .entry(R::TABLE)
            .or_default()
            .insert(record.id(), value);
        Ok(())
    }

    fn unlinked<R, F>(
        &self,
        scope: &TenantScope,
        after: Option<Uuid>,
        limit: usize,
        project: F,
    ) -> StoreResult<Vec<UnlinkedChild>>
    where
        R: Record,
        F: Fn(&R) -> Option<UnlinkedChild>,
    {
        Ok(self
            .scoped_rows::<R>(scope)?
            .iter()
            .filter(|r| after.map_or(true, |a| r.id() > a))
            .filter_map(project)
            .take(limit)
            .collect())
    }

    fn link_row<R, F>(&self, child_id: Uuid, link: F) -> StoreResult<bool>
    where
        R: Record,
        F: FnOnce(&mut R) -> bool,
    {
        self.check_writable(R::TABLE)?;
        let mut state = self.lock()?;
        let Some(value) = state.tables.get(&R::TABLE).and_then(|t| t.get(&child_id)) else {
            return Ok(false);
        };
        let mut row: R = serde_json::from_value(value.clone())?;
        if !link(&mut row) {
            return Ok(false);
        }
        Self::put(&mut state, &row)?;
        Ok(true)
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore {
    async fn fetch(&self, id: Uuid) -> StoreResult<Option<R>> {
        self.check_readable(R::TABLE)?;
        let state = self.lock()?;
        state
            .tables
            .get(&R::TABLE)
            .and_then(|rows| rows.get(&id))
            .map(|v| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .transpose()
    }

    async fn insert(&self, record: &R) -> StoreResult<bool> {
        self.pause_before_write(R::TABLE).await;
        self.check_writable(R::TABLE)?;
        let mut state = self.lock()?;
        let exists = state
            .tables
            .get(&R::TABLE)
            .is_some_and(|rows| rows.contains_key(&record.id()));
        if exists {
            return Ok(false);
        }
        Self::put(&mut state, record)?;
        Ok(true)
    }

    async fn update(&self, record: &R) -> StoreResult<()> {
        self.pause_before_write(R::TABLE).await;
        self.check_writable(R::TABLE)?;
        let mut state = self.lock()?;
        Self::put(&mut state, record)
    }

    async fn list(&self, scope: &TenantScope) -> StoreResult<Vec<R>> {
        self.scoped_rows(scope)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    async fn count(&self, scope: &TenantScope, table: Table) -> StoreResult<i64> {
        use crate::models::*;

        let n = match table {
            Table::Companies => self.scoped_rows::<Company>(scope)?.len(),
            Table::Divisions => self.scoped_rows::<Division>(scope)?.len(),
            Table::Groups => self.scoped_rows::<Group>(scope)?.len(),
            Table::Ledgers => self.scoped_rows::<Ledger>(scope)?.len(),
            Table::Units => self.scoped_rows::<Unit>(scope)?.len(),
            Table::StockGroups => self.scoped_rows::<StockGroup>(scope)?.len(),
            Table::StockItems => self.scoped_rows::<StockItem>(scope)?.len(),
            Table::Godowns => self.scoped_rows::<Godown>(scope)?.len(),
            Table::CostCentres => self.scoped_rows::<CostCentre>(scope)?.len(),
            Table::VoucherTypes => self.scoped_rows::<VoucherType>(scope)?.len(),
            Table::Vouchers => self.scoped_rows::<Voucher>(scope)?.len(),
            Table::LedgerEntries => self.scoped_rows::<LedgerEntry>(scope)?.len(),
            Table::InventoryEntries => self.scoped_rows::<InventoryEntry>(scope)?.len(),
        };
        Ok(n as i64)
    }

    async fn unlinked_children(
        &self,
        scope: &TenantScope,
        table: Table,
        after: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<UnlinkedChild>> {
        match table {
            Table::LedgerEntries => self.unlinked::<LedgerEntry, _>(scope, after, limit, |e| {
                (e.voucher_id.is_none() && !e.voucher_number.trim().is_empty()).then(|| UnlinkedChild {
                    id: e.id,
                    table,
                    voucher_number: e.voucher_number.clone(),
                    voucher_type: e.voucher_type.clone(),
                })
            }),
            Table::InventoryEntries => self.unlinked::<InventoryEntry, _>(scope, after, limit, |e| {
                (e.voucher_id.is_none() && !e.voucher_number.trim().is_empty()).then(|| UnlinkedChild {
                    id: e.id,
                    table,
                    voucher_number: e.voucher_number.clone(),
                    voucher_type: e.voucher_type.clone(),
                })
            }),
            _ => Ok(Vec::new()),
        }
    }

    async fn vouchers_by_number(
        &self,
        scope: &TenantScope,
        voucher_number: &str,
    ) -> StoreResult<Vec<VoucherRef>> {
        Ok(self
            .scoped_rows::<Voucher>(scope)?
            .into_iter()
            .filter(|v| v.voucher_number == voucher_number)
            .map(|v| VoucherRef {
                id: v.id,
                voucher_type: v.voucher_type,
            })
            .collect())
    }

    async fn link_child(&self, table: Table, child_id: Uuid, voucher_id: Uuid) -> StoreResult<bool> {
        match table {
            Table::LedgerEntries => self.link_row::<LedgerEntry, _>(child_id, |e| {
                if e.voucher_id.is_some() {
                    return false;
                }
                e.voucher_id = Some(voucher_id);
                true
            }),
            Table::InventoryEntries => self.link_row::<InventoryEntry, _>(child_id, |e| {
                if e.voucher_id.is_some() {
                    return false;
                }
                e.voucher_id = Some(voucher_id);
                true
            }),
            other => Err(StoreError::Rejected {
                table: other,
                message: "not a voucher child table".to_string(),
            }),
        }
    }

    async fn vouchers_missing_amounts(
        &self,
        scope: &TenantScope,
        after: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .scoped_rows::<Voucher>(scope)?
            .into_iter()
            .filter(Voucher::needs_amounts)
            .map(|v| v.id)
            .filter(|id| after.map_or(true, |a| *id > a))
            .take(limit)
            .collect())
    }

    async fn ledger_entries_for_voucher(&self, voucher_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let state = self.lock()?;
        Ok(Self::rows::<LedgerEntry>(&state)?
            .into_iter()
            .filter(|e| e.voucher_id == Some(voucher_id))
            .collect())
    }

    async fn set_voucher_amounts(&self, voucher_id: Uuid, amounts: &VoucherAmounts) -> StoreResult<bool> {
        self.check_writable(Table::Vouchers)?;
        let mut state = self.lock()?;
        let value = state
            .tables
            .get(&Table::Vouchers)
            .and_then(|t| t.get(&voucher_id))
            .ok_or_else(|| StoreError::not_found(Table::Vouchers, voucher_id))?;
        let mut voucher: Voucher = serde_json::from_value(value.clone())?;
        if voucher.amounts().as_ref() == Some(amounts) {
            return Ok(false);
        }
        voucher.total_amount = Some(amounts.total);
        voucher.net_amount = Some(amounts.net);
        voucher.basic_amount = Some(amounts.basic);
        voucher.final_amount = Some(amounts.final_amount);
        Self::put(&mut state, &voucher)?;
        Ok(true)
    }

    async fn create_job(&self, job: &SyncJob) -> StoreResult<()> {
        self.lock()?.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &SyncJob) -> StoreResult<()> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("sync job '{}' not found", job.id))),
        }
    }

    async fn insert_job_details(&self, details: &[SyncJobDetail]) -> StoreResult<()> {
        self.lock()?.details.extend_from_slice(details);
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<SyncJob>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, scope: &TenantScope, limit: i64) -> StoreResult<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .lock()?
            .jobs
            .values()
            .filter(|j| j.scope() == *scope)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Ledger;
    use ledgersync_common::SyncAction;

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    #[tokio::test]
    async fn test_insert_is_conditional() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&scope(), "Cash");

        assert!(RecordStore::<Ledger>::insert(&store, &ledger).await.unwrap());
        assert!(!RecordStore::<Ledger>::insert(&store, &ledger).await.unwrap());

        let fetched: Ledger = db::get(&store, ledger.id).await.unwrap().unwrap();
        assert_eq!(fetched, ledger);
        assert_eq!(store.count(&scope(), Table::Ledgers).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_respects_scope() {
        let store = MemoryStore::new();
        let other = TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(3));
        RecordStore::<Ledger>::insert(&store, &Ledger::new(&scope(), "Cash")).await.unwrap();
        RecordStore::<Ledger>::insert(&store, &Ledger::new(&other, "Cash")).await.unwrap();

        let rows: Vec<Ledger> = db::list(&store, &scope()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].division_id, scope().division_id);
    }

    #[tokio::test]
    async fn test_failing_table_rejects_writes() {
        let store = MemoryStore::new().fail_writes_to(Table::Ledgers);
        let err = RecordStore::<Ledger>::insert(&store, &Ledger::new(&scope(), "Cash"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { table: Table::Ledgers, .. }));
    }

    #[tokio::test]
    async fn test_unreadable_table_rejects_reads() {
        let store = MemoryStore::new().fail_reads_from(Table::Ledgers);
        let err = db::list::<Ledger, _>(&store, &scope()).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { table: Table::Ledgers, .. }));
        assert!(store.count(&scope(), Table::Groups).await.is_ok());
    }

    #[tokio::test]
    async fn test_jobs_newest_first() {
        let store = MemoryStore::new();
        let mut first = SyncJob::start(&scope(), SyncAction::FullSync);
        first.started_at -= chrono::Duration::minutes(5);
        let second = SyncJob::start(&scope(), SyncAction::FullSync);
        store.create_job(&first).await.unwrap();
        store.create_job(&second).await.unwrap();

        let jobs = store.list_jobs(&scope(), 10).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second.id);

        let missing = SyncJob::start(&scope(), SyncAction::FullSync);
        assert!(store.update_job(&missing).await.is_err());
    }
}
