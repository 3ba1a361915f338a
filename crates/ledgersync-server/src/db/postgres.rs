//! PostgreSQL store
//!
//! Queries are built at runtime from each table's column list, so one
//! generic [`RecordStore`] implementation serves every [`PgRecord`].
//! Inserts are `ON CONFLICT (id) DO NOTHING`; concurrent writers of the
//! same deterministic id never fail, one of them simply reports `false`.

use async_trait::async_trait;
use ledgersync_common::{Table, TenantScope};
use sqlx::postgres::{PgArguments, PgPool, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{FromRow, QueryBuilder};
use uuid::Uuid;

use super::{RecordStore, Store, StoreError, StoreResult, UnlinkedChild, VoucherRef};
use crate::models::{
    Company, CostCentre, Division, Godown, Group, InventoryEntry, Ledger, LedgerEntry, Record,
    StockGroup, StockItem, SyncJob, SyncJobDetail, Unit, Voucher, VoucherAmounts, VoucherType,
};

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Column mapping of a [`Record`] onto its table.
pub trait PgRecord: Record + for<'r> FromRow<'r, PgRow> {
    /// All columns, `id` first, in bind order.
    const COLUMNS: &'static [&'static str];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q>;

    /// SET clause item for `column` when updating.
    fn update_assignment(column: &str, placeholder: &str) -> String {
        format!("{} = {}", column, placeholder)
    }
}

fn scope_clause(table: Table) -> &'static str {
    match table {
        Table::Companies => "id = $1 AND $2::uuid IS NOT NULL",
        Table::Divisions => "company_id = $1 AND id = $2",
        _ => "company_id = $1 AND division_id = $2",
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("${}", i)).collect::<Vec<_>>().join(", ")
}

fn insert_sql<R: PgRecord>() -> String {
    format!(
        r#"INSERT INTO "{}" ({}) VALUES ({}) ON CONFLICT (id) DO NOTHING"#,
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders(R::COLUMNS.len())
    )
}

fn update_sql<R: PgRecord>() -> String {
    let assignments = R::COLUMNS
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, column)| R::update_assignment(column, &format!("${}", i + 1)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"UPDATE "{}" SET {}, updated_at = NOW() WHERE id = $1"#,
        R::TABLE,
        assignments
    )
}

fn select_sql<R: PgRecord>(predicate: &str) -> String {
    format!(
        r#"SELECT {} FROM "{}" WHERE {} ORDER BY id"#,
        R::COLUMNS.join(", "),
        R::TABLE,
        predicate
    )
}

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Sqlx(e.into()))
    }
}

#[async_trait]
impl<R: PgRecord> RecordStore<R> for PgStore {
    async fn fetch(&self, id: Uuid) -> StoreResult<Option<R>> {
        let sql = select_sql::<R>("id = $1");
        let row = sqlx::query_as::<_, R>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert(&self, record: &R) -> StoreResult<bool> {
        let sql = insert_sql::<R>();
        let result = record.bind(sqlx::query(&sql)).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update(&self, record: &R) -> StoreResult<()> {
        let sql = update_sql::<R>();
        let result = record.bind(sqlx::query(&sql)).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(R::TABLE, record.id()));
        }
        Ok(())
    }

    async fn list(&self, scope: &TenantScope) -> StoreResult<Vec<R>> {
        let sql = select_sql::<R>(scope_clause(R::TABLE));
        let rows = sqlx::query_as::<_, R>(&sql)
            .bind(scope.company_id)
            .bind(scope.division_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self, scope: &TenantScope, table: Table) -> StoreResult<i64> {
        let sql = format!(r#"SELECT COUNT(*) FROM "{}" WHERE {}"#, table, scope_clause(table));
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(scope.company_id)
            .bind(scope.division_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn unlinked_children(
        &self,
        scope: &TenantScope,
        table: Table,
        after: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<UnlinkedChild>> {
        if !table.is_voucher_child() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT id, voucher_number, voucher_type
            FROM "{}"
            WHERE company_id = $1 AND division_id = $2
              AND voucher_id IS NULL
              AND btrim(voucher_number) <> ''
              AND ($3::uuid IS NULL OR id > $3)
            ORDER BY id
            LIMIT $4
            "#,
            table
        );
        let rows: Vec<(Uuid, String, Option<String>)> = sqlx::query_as(&sql)
            .bind(scope.company_id)
            .bind(scope.division_id)
            .bind(after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, voucher_number, voucher_type)| UnlinkedChild {
                id,
                table,
                voucher_number,
                voucher_type,
            })
            .collect())
    }

    async fn vouchers_by_number(
        &self,
        scope: &TenantScope,
        voucher_number: &str,
    ) -> StoreResult<Vec<VoucherRef>> {
        let rows = sqlx::query_as::<_, VoucherRef>(
            r#"
            SELECT id, voucher_type
            FROM vouchers
            WHERE company_id = $1 AND division_id = $2 AND voucher_number = $3
            "#,
        )
        .bind(scope.company_id)
        .bind(scope.division_id)
        .bind(voucher_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn link_child(&self, table: Table, child_id: Uuid, voucher_id: Uuid) -> StoreResult<bool> {
        if !table.is_voucher_child() {
            return Err(StoreError::Rejected {
                table,
                message: "not a voucher child table".to_string(),
            });
        }
        let sql = format!(
            r#"UPDATE "{}" SET voucher_id = $2, updated_at = NOW() WHERE id = $1 AND voucher_id IS NULL"#,
            table
        );
        let result = sqlx::query(&sql)
            .bind(child_id)
            .bind(voucher_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn vouchers_missing_amounts(
        &self,
        scope: &TenantScope,
        after: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM vouchers
            WHERE company_id = $1 AND division_id = $2
              AND (total_amount IS NULL OR total_amount = 0
                   OR final_amount IS NULL OR final_amount = 0)
              AND ($3::uuid IS NULL OR id > $3)
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(scope.company_id)
        .bind(scope.division_id)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn ledger_entries_for_voucher(&self, voucher_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let sql = select_sql::<LedgerEntry>("voucher_id = $1");
        let rows = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(voucher_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_voucher_amounts(&self, voucher_id: Uuid, amounts: &VoucherAmounts) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE vouchers
            SET total_amount = $2, net_amount = $3, basic_amount = $4, final_amount = $5,
                updated_at = NOW()
            WHERE id = $1
              AND (total_amount, net_amount, basic_amount, final_amount)
                  IS DISTINCT FROM ($2, $3, $4, $5)
            "#,
        )
        .bind(voucher_id)
        .bind(amounts.total)
        .bind(amounts.net)
        .bind(amounts.basic)
        .bind(amounts.final_amount)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM vouchers WHERE id = $1)")
            .bind(voucher_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(StoreError::not_found(Table::Vouchers, voucher_id));
        }
        Ok(false)
    }

    async fn create_job(&self, job: &SyncJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, company_id, division_id, action, status, started_at, completed_at,
                inserted, updated, ignored, created_master, errors, linked, reconciled,
                table_breakdown, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(job.id)
        .bind(job.company_id)
        .bind(job.division_id)
        .bind(&job.action)
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.inserted)
        .bind(job.updated)
        .bind(job.ignored)
        .bind(job.created_master)
        .bind(job.errors)
        .bind(job.linked)
        .bind(job.reconciled)
        .bind(&job.table_breakdown)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job(&self, job: &SyncJob) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = $2, completed_at = $3, inserted = $4, updated = $5, ignored = $6,
                created_master = $7, errors = $8, linked = $9, reconciled = $10,
                table_breakdown = $11, error_message = $12
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.completed_at)
        .bind(job.inserted)
        .bind(job.updated)
        .bind(job.ignored)
        .bind(job.created_master)
        .bind(job.errors)
        .bind(job.linked)
        .bind(job.reconciled)
        .bind(&job.table_breakdown)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sync job '{}' not found", job.id)));
        }
        Ok(())
    }

    async fn insert_job_details(&self, details: &[SyncJobDetail]) -> StoreResult<()> {
        if details.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO sync_job_details (id, job_id, table_name, record_id, action, message, created_at) ",
        );
        builder.push_values(details, |mut row, detail| {
            row.push_bind(detail.id)
                .push_bind(detail.job_id)
                .push_bind(&detail.table_name)
                .push_bind(&detail.record_id)
                .push_bind(&detail.action)
                .push_bind(&detail.message)
                .push_bind(detail.created_at);
        });
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<SyncJob>> {
        let job = sqlx::query_as::<_, SyncJob>("SELECT * FROM sync_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn list_jobs(&self, scope: &TenantScope, limit: i64) -> StoreResult<Vec<SyncJob>> {
        let jobs = sqlx::query_as::<_, SyncJob>(
            r#"
            SELECT * FROM sync_jobs
            WHERE company_id = $1 AND division_id = $2
            ORDER BY started_at DESC
            LIMIT $3
            "#,
        )
        .bind(scope.company_id)
        .bind(scope.division_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }
}

// ============================================================================
// Column mappings
// ============================================================================

impl PgRecord for Company {
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query.bind(self.id).bind(&self.name)
    }
}

impl PgRecord for Division {
    const COLUMNS: &'static [&'static str] = &["id", "company_id", "name"];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query.bind(self.id).bind(self.company_id).bind(&self.name)
    }
}

impl PgRecord for Group {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "parent_name",
        "parent_id",
        "is_deemed_positive",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
            .bind(self.is_deemed_positive)
    }
}

impl PgRecord for Ledger {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "parent_name",
        "parent_id",
        "address",
        "state",
        "pincode",
        "email",
        "phone",
        "gstin",
        "pan",
        "opening_balance",
        "closing_balance",
        "is_deemed_positive",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
            .bind(&self.address)
            .bind(&self.state)
            .bind(&self.pincode)
            .bind(&self.email)
            .bind(&self.phone)
            .bind(&self.gstin)
            .bind(&self.pan)
            .bind(self.opening_balance)
            .bind(self.closing_balance)
            .bind(self.is_deemed_positive)
    }
}

impl PgRecord for Unit {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "formal_name",
        "decimal_places",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.formal_name)
            .bind(self.decimal_places)
    }
}

impl PgRecord for StockGroup {
    const COLUMNS: &'static [&'static str] =
        &["id", "company_id", "division_id", "name", "parent_name", "parent_id"];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
    }
}

impl PgRecord for StockItem {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "parent_name",
        "parent_id",
        "base_unit",
        "unit_id",
        "opening_quantity",
        "opening_rate",
        "opening_value",
        "closing_quantity",
        "closing_rate",
        "closing_value",
        "hsn_code",
        "gst_rate",
        "taxability",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
            .bind(&self.base_unit)
            .bind(self.unit_id)
            .bind(self.opening_quantity)
            .bind(self.opening_rate)
            .bind(self.opening_value)
            .bind(self.closing_quantity)
            .bind(self.closing_rate)
            .bind(self.closing_value)
            .bind(&self.hsn_code)
            .bind(self.gst_rate)
            .bind(&self.taxability)
    }
}

impl PgRecord for Godown {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "parent_name",
        "parent_id",
        "address",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
            .bind(&self.address)
    }
}

impl PgRecord for CostCentre {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "parent_name",
        "parent_id",
        "category",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
            .bind(&self.category)
    }
}

impl PgRecord for VoucherType {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "name",
        "parent_name",
        "parent_id",
        "is_deemed_positive",
        "affects_stock",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.name)
            .bind(&self.parent_name)
            .bind(self.parent_id)
            .bind(self.is_deemed_positive)
            .bind(self.affects_stock)
    }
}

impl PgRecord for Voucher {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "guid",
        "voucher_number",
        "voucher_type",
        "voucher_type_id",
        "date",
        "reference",
        "narration",
        "party_ledger_name",
        "party_ledger_id",
        "total_amount",
        "net_amount",
        "basic_amount",
        "final_amount",
        "alter_id",
        "is_cancelled",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(&self.guid)
            .bind(&self.voucher_number)
            .bind(&self.voucher_type)
            .bind(self.voucher_type_id)
            .bind(self.date)
            .bind(&self.reference)
            .bind(&self.narration)
            .bind(&self.party_ledger_name)
            .bind(self.party_ledger_id)
            .bind(self.total_amount)
            .bind(self.net_amount)
            .bind(self.basic_amount)
            .bind(self.final_amount)
            .bind(self.alter_id)
            .bind(self.is_cancelled)
    }

    /// Aggregates written concurrently by the reconciler are kept.
    fn update_assignment(column: &str, placeholder: &str) -> String {
        match column {
            "total_amount" | "net_amount" | "basic_amount" | "final_amount" => {
                format!("{0} = COALESCE({0}, {1})", column, placeholder)
            }
            _ => format!("{} = {}", column, placeholder),
        }
    }
}

impl PgRecord for LedgerEntry {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "voucher_id",
        "voucher_guid",
        "voucher_number",
        "voucher_type",
        "ledger_name",
        "ledger_id",
        "amount",
        "is_deemed_positive",
        "is_party_ledger",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(self.voucher_id)
            .bind(&self.voucher_guid)
            .bind(&self.voucher_number)
            .bind(&self.voucher_type)
            .bind(&self.ledger_name)
            .bind(self.ledger_id)
            .bind(self.amount)
            .bind(self.is_deemed_positive)
            .bind(self.is_party_ledger)
    }

    fn update_assignment(column: &str, placeholder: &str) -> String {
        keep_link(column, placeholder)
    }
}

impl PgRecord for InventoryEntry {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "company_id",
        "division_id",
        "voucher_id",
        "voucher_guid",
        "voucher_number",
        "voucher_type",
        "stock_item_name",
        "stock_item_id",
        "godown_name",
        "godown_id",
        "quantity",
        "unit",
        "rate",
        "amount",
        "is_deemed_positive",
    ];

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.id)
            .bind(self.company_id)
            .bind(self.division_id)
            .bind(self.voucher_id)
            .bind(&self.voucher_guid)
            .bind(&self.voucher_number)
            .bind(&self.voucher_type)
            .bind(&self.stock_item_name)
            .bind(self.stock_item_id)
            .bind(&self.godown_name)
            .bind(self.godown_id)
            .bind(self.quantity)
            .bind(&self.unit)
            .bind(self.rate)
            .bind(self.amount)
            .bind(self.is_deemed_positive)
    }

    fn update_assignment(column: &str, placeholder: &str) -> String {
        keep_link(column, placeholder)
    }
}

/// An established voucher link survives updates.
fn keep_link(column: &str, placeholder: &str) -> String {
    if column == "voucher_id" {
        format!("voucher_id = COALESCE({}, voucher_id)", placeholder)
    } else {
        format!("{} = {}", column, placeholder)
    }
}
