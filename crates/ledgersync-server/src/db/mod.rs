//! Store abstraction
//!
//! [`RecordStore`] covers the per-table operations the upsert engine needs
//! (fetch, conditional insert, update, list). [`Store`] bundles one
//! `RecordStore` per table with the set-oriented queries of the linker,
//! the reconciler and job recording.
//!
//! Two implementations exist: [`PgStore`] on PostgreSQL and [`MemoryStore`]
//! for tests and dry runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use ledgersync_common::{Table, TenantScope};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{
    Company, CostCentre, Division, Godown, Group, InventoryEntry, Ledger, LedgerEntry, Record,
    StockGroup, StockItem, SyncJob, SyncJobDetail, Unit, Voucher, VoucherAmounts, VoucherType,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A store operation did not finish in time
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row could not be converted to or from its model
    #[error("Row serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// In-memory state is unusable after a panic while locked
    #[error("Store lock poisoned")]
    Poisoned,

    /// Requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Write rejected by the store
    #[error("Write to {table} rejected: {message}")]
    Rejected { table: Table, message: String },
}

impl StoreError {
    pub fn not_found(table: Table, id: Uuid) -> Self {
        Self::NotFound(format!("{} '{}' not found", table, id))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A child row still waiting for its voucher link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlinkedChild {
    pub id: Uuid,
    pub table: Table,
    pub voucher_number: String,
    pub voucher_type: Option<String>,
}

/// Voucher candidate returned by a natural-key lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct VoucherRef {
    pub id: Uuid,
    pub voucher_type: Option<String>,
}

/// Per-table persistence of one [`Record`] type.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn fetch(&self, id: Uuid) -> StoreResult<Option<R>>;

    /// Insert unless a row with the same id exists. Returns whether a row
    /// was written.
    async fn insert(&self, record: &R) -> StoreResult<bool>;

    /// Overwrite the row with the same id.
    async fn update(&self, record: &R) -> StoreResult<()>;

    async fn list(&self, scope: &TenantScope) -> StoreResult<Vec<R>>;
}

/// Everything the pipeline needs from persistence.
#[async_trait]
pub trait Store:
    RecordStore<Company>
    + RecordStore<Division>
    + RecordStore<Group>
    + RecordStore<Ledger>
    + RecordStore<Unit>
    + RecordStore<StockGroup>
    + RecordStore<StockItem>
    + RecordStore<Godown>
    + RecordStore<CostCentre>
    + RecordStore<VoucherType>
    + RecordStore<Voucher>
    + RecordStore<LedgerEntry>
    + RecordStore<InventoryEntry>
    + Send
    + Sync
    + 'static
{
    async fn ping(&self) -> StoreResult<()>;

    /// Row count of a table within a scope.
    async fn count(&self, scope: &TenantScope, table: Table) -> StoreResult<i64>;

    /// Unlinked rows of a child table that carry a voucher number, in id
    /// order and starting strictly after `after`.
    async fn unlinked_children(
        &self,
        scope: &TenantScope,
        table: Table,
        after: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<UnlinkedChild>>;

    async fn vouchers_by_number(
        &self,
        scope: &TenantScope,
        voucher_number: &str,
    ) -> StoreResult<Vec<VoucherRef>>;

    /// Set the voucher link of a child row that is still unlinked. Returns
    /// whether the row changed.
    async fn link_child(&self, table: Table, child_id: Uuid, voucher_id: Uuid) -> StoreResult<bool>;

    /// Vouchers whose total or final amount is null or zero, in id order
    /// and starting strictly after `after`.
    async fn vouchers_missing_amounts(
        &self,
        scope: &TenantScope,
        after: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<Uuid>>;

    async fn ledger_entries_for_voucher(&self, voucher_id: Uuid) -> StoreResult<Vec<LedgerEntry>>;

    /// Write the aggregates of a voucher. Returns whether any stored value
    /// changed.
    async fn set_voucher_amounts(&self, voucher_id: Uuid, amounts: &VoucherAmounts) -> StoreResult<bool>;

    async fn create_job(&self, job: &SyncJob) -> StoreResult<()>;

    async fn update_job(&self, job: &SyncJob) -> StoreResult<()>;

    async fn insert_job_details(&self, details: &[SyncJobDetail]) -> StoreResult<()>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<SyncJob>>;

    /// Most recent jobs of a scope, newest first.
    async fn list_jobs(&self, scope: &TenantScope, limit: i64) -> StoreResult<Vec<SyncJob>>;
}

/// Fetch a row of type `R` from any store.
pub async fn get<R, S>(store: &S, id: Uuid) -> StoreResult<Option<R>>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    store.fetch(id).await
}

/// List the rows of type `R` in a scope.
pub async fn list<R, S>(store: &S, scope: &TenantScope) -> StoreResult<Vec<R>>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    store.list(scope).await
}

/// Create the PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}
