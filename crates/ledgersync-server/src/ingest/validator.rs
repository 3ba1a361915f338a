//! Referential integrity validator
//!
//! Read-only audit of one tenant scope. Tables are loaded in dependency
//! order and projected to [`AuditRow`]s; every check then runs against the
//! in-memory id sets. A table that cannot be read is reported and skipped,
//! and references into it are not judged.

use chrono::{DateTime, Utc};
use ledgersync_common::{Table, TenantScope};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{self, RecordStore, Store, StoreResult};
use crate::models::{
    AuditRow, Company, CostCentre, Division, Godown, Group, InventoryEntry, Ledger, LedgerEntry, Record,
    StockGroup, StockItem, Unit, Voucher, VoucherType,
};

/// Tolerance for aggregate amount comparisons.
pub const AMOUNT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Issues kept per table; counts are always exact.
pub const DEFAULT_ISSUE_SAMPLE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Idle,
    Running,
    Success,
    PartialFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    OrphanedReference,
    DuplicateNaturalKey,
    SelfParent,
    NullRequired,
    AmountMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub record_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Checks of one table.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub table: Table,
    pub records: usize,
    pub issue_count: usize,
    pub issues: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn failed(table: Table, error: String) -> Self {
        Self {
            table,
            records: 0,
            issue_count: 0,
            issues: Vec::new(),
            error: Some(error),
        }
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub scope: TenantScope,
    pub status: ValidationState,
    pub tables: Vec<ValidationResult>,
    pub total_records: usize,
    pub total_issues: usize,
    pub health_score: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn table(&self, table: Table) -> Option<&ValidationResult> {
        self.tables.iter().find(|r| r.table == table)
    }
}

/// `100 × (1 − issues/records)`, floored at zero; an empty dataset is healthy.
pub fn health_score(total_records: usize, total_issues: usize) -> f64 {
    if total_records == 0 {
        return 100.0;
    }
    let score = 100.0 * (1.0 - total_issues as f64 / total_records as f64);
    (score.max(0.0) * 100.0).round() / 100.0
}

/// Side data needed by the amount check.
#[derive(Default)]
struct AmountIndex {
    voucher_totals: HashMap<Uuid, Option<Decimal>>,
    entry_sums: HashMap<Uuid, Decimal>,
}

pub struct IntegrityValidator<'a, S: Store> {
    store: &'a S,
    state: ValidationState,
    issue_sample: usize,
}

impl<'a, S: Store> IntegrityValidator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            state: ValidationState::Idle,
            issue_sample: DEFAULT_ISSUE_SAMPLE,
        }
    }

    pub fn with_issue_sample(mut self, limit: usize) -> Self {
        self.issue_sample = limit;
        self
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    #[tracing::instrument(skip(self, scope, cancel), fields(scope = %scope))]
    pub async fn validate(&mut self, scope: &TenantScope, cancel: &CancellationToken) -> ValidationReport {
        self.state = ValidationState::Running;
        let started_at = Utc::now();

        let mut amounts = AmountIndex::default();
        let mut loaded: Vec<(Table, Result<Vec<AuditRow>, String>)> = Vec::new();
        let mut partial = false;

        for table in Table::DEPENDENCY_ORDER {
            if cancel.is_cancelled() {
                tracing::warn!(table = %table, "Validation cancelled");
                partial = true;
                break;
            }
            let rows = self.load(scope, table, &mut amounts).await.map_err(|e| {
                tracing::warn!(table = %table, error = %e, "Table could not be read");
                e.to_string()
            });
            partial |= rows.is_err();
            loaded.push((table, rows));
        }

        let ids: HashMap<Table, HashSet<Uuid>> = loaded
            .iter()
            .filter_map(|(table, rows)| {
                rows.as_ref()
                    .ok()
                    .map(|rows| (*table, rows.iter().map(|r| r.id).collect()))
            })
            .collect();

        let tables: Vec<ValidationResult> = loaded
            .into_iter()
            .map(|(table, rows)| match rows {
                Ok(rows) => self.check_table(table, &rows, &ids, &amounts),
                Err(e) => ValidationResult::failed(table, e),
            })
            .collect();

        let total_records = tables.iter().map(|t| t.records).sum();
        let total_issues = tables.iter().map(|t| t.issue_count).sum();
        self.state = if partial {
            ValidationState::PartialFailure
        } else {
            ValidationState::Success
        };

        let report = ValidationReport {
            scope: *scope,
            status: self.state,
            tables,
            total_records,
            total_issues,
            health_score: health_score(total_records, total_issues),
            started_at,
            completed_at: Utc::now(),
        };
        tracing::info!(
            status = ?report.status,
            records = report.total_records,
            issues = report.total_issues,
            health_score = report.health_score,
            "Validation finished"
        );
        report
    }

    async fn load(&self, scope: &TenantScope, table: Table, amounts: &mut AmountIndex) -> StoreResult<Vec<AuditRow>> {
        let store = self.store;
        Ok(match table {
            Table::Companies => audit_table::<Company, S>(store, scope).await?,
            Table::Divisions => audit_table::<Division, S>(store, scope).await?,
            Table::Groups => audit_table::<Group, S>(store, scope).await?,
            Table::Ledgers => audit_table::<Ledger, S>(store, scope).await?,
            Table::Units => audit_table::<Unit, S>(store, scope).await?,
            Table::StockGroups => audit_table::<StockGroup, S>(store, scope).await?,
            Table::StockItems => audit_table::<StockItem, S>(store, scope).await?,
            Table::Godowns => audit_table::<Godown, S>(store, scope).await?,
            Table::CostCentres => audit_table::<CostCentre, S>(store, scope).await?,
            Table::VoucherTypes => audit_table::<VoucherType, S>(store, scope).await?,
            Table::Vouchers => {
                let vouchers: Vec<Voucher> = db::list(store, scope).await?;
                amounts.voucher_totals = vouchers.iter().map(|v| (v.id, v.total_amount)).collect();
                audits(&vouchers)
            }
            Table::LedgerEntries => {
                let entries: Vec<LedgerEntry> = db::list(store, scope).await?;
                for entry in &entries {
                    if let Some(voucher_id) = entry.voucher_id {
                        *amounts.entry_sums.entry(voucher_id).or_default() += entry.amount.abs();
                    }
                }
                audits(&entries)
            }
            Table::InventoryEntries => audit_table::<InventoryEntry, S>(store, scope).await?,
        })
    }

    fn check_table(
        &self,
        table: Table,
        rows: &[AuditRow],
        ids: &HashMap<Table, HashSet<Uuid>>,
        amounts: &AmountIndex,
    ) -> ValidationResult {
        let mut issues = Vec::new();
        let mut seen_keys: HashMap<&str, Uuid> = HashMap::new();

        for row in rows {
            for reference in &row.references {
                let Some(known) = ids.get(&reference.table) else {
                    continue;
                };
                if !known.contains(&reference.id) {
                    issues.push(ValidationIssue {
                        kind: IssueKind::OrphanedReference,
                        record_id: row.id,
                        field: Some(reference.field.to_string()),
                        message: format!("{} {} not found in {}", reference.field, reference.id, reference.table),
                    });
                }
            }

            if let Some(key) = row.natural_key.as_deref() {
                if let Some(first) = seen_keys.get(key) {
                    issues.push(ValidationIssue {
                        kind: IssueKind::DuplicateNaturalKey,
                        record_id: row.id,
                        field: None,
                        message: format!("natural key '{}' already used by {}", key, first),
                    });
                } else {
                    seen_keys.insert(key, row.id);
                }
            }

            if row.parent_id == Some(row.id) {
                issues.push(ValidationIssue {
                    kind: IssueKind::SelfParent,
                    record_id: row.id,
                    field: Some("parent_id".to_string()),
                    message: "row is its own parent".to_string(),
                });
            }

            for column in &row.missing_required {
                issues.push(ValidationIssue {
                    kind: IssueKind::NullRequired,
                    record_id: row.id,
                    field: Some(column.to_string()),
                    message: format!("{} is null", column),
                });
            }
        }

        if table == Table::Vouchers {
            issues.extend(amount_mismatches(amounts));
        }

        let issue_count = issues.len();
        issues.truncate(self.issue_sample);
        tracing::debug!(table = %table, records = rows.len(), issues = issue_count, "Table checked");

        ValidationResult {
            table,
            records: rows.len(),
            issue_count,
            issues,
            error: None,
        }
    }
}

fn audits<R: Record>(rows: &[R]) -> Vec<AuditRow> {
    rows.iter().map(Record::audit).collect()
}

async fn audit_table<R, S>(store: &S, scope: &TenantScope) -> StoreResult<Vec<AuditRow>>
where
    R: Record,
    S: RecordStore<R>,
{
    let rows: Vec<R> = db::list(store, scope).await?;
    Ok(audits(&rows))
}

fn amount_mismatches(amounts: &AmountIndex) -> Vec<ValidationIssue> {
    let mut issues: Vec<ValidationIssue> = amounts
        .voucher_totals
        .iter()
        .filter_map(|(id, total)| {
            let total = total.filter(|t| !t.is_zero())?;
            let sum = amounts.entry_sums.get(id).copied().unwrap_or(Decimal::ZERO);
            ((total - sum).abs() > AMOUNT_EPSILON).then(|| ValidationIssue {
                kind: IssueKind::AmountMismatch,
                record_id: *id,
                field: Some("total_amount".to_string()),
                message: format!("total_amount {} differs from entry sum {}", total, sum),
            })
        })
        .collect();
    issues.sort_by_key(|i| i.record_id);
    issues
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use ledgersync_common::identity::{ledger_entry_id, master_id, voucher_id};
    use ledgersync_common::MasterKind;

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        RecordStore::<Company>::insert(&store, &Company::new(scope().company_id, "Acme"))
            .await
            .unwrap();
        RecordStore::<Division>::insert(&store, &Division::new(scope().division_id, scope().company_id, "Head Office"))
            .await
            .unwrap();
        store
    }

    fn voucher(guid: &str, number: &str, total: Option<i64>) -> Voucher {
        Voucher {
            id: voucher_id(&scope(), guid),
            company_id: scope().company_id,
            division_id: scope().division_id,
            guid: guid.into(),
            voucher_number: number.into(),
            voucher_type: Some("Sales".into()),
            voucher_type_id: None,
            date: chrono::NaiveDate::from_ymd_opt(2024, 4, 1),
            reference: None,
            narration: None,
            party_ledger_name: None,
            party_ledger_id: None,
            total_amount: total.map(Decimal::from),
            net_amount: None,
            basic_amount: None,
            final_amount: None,
            alter_id: None,
            is_cancelled: false,
        }
    }

    #[test]
    fn test_health_score() {
        assert_eq!(health_score(0, 0), 100.0);
        assert_eq!(health_score(10, 1), 90.0);
        assert_eq!(health_score(2, 5), 0.0);
        assert_eq!(AMOUNT_EPSILON, Decimal::new(1, 2));
    }

    #[tokio::test]
    async fn test_empty_scope_is_healthy() {
        let store = MemoryStore::new();
        let mut validator = IntegrityValidator::new(&store);
        assert_eq!(validator.state(), ValidationState::Idle);

        let report = validator.validate(&scope(), &CancellationToken::new()).await;

        assert_eq!(report.status, ValidationState::Success);
        assert_eq!(validator.state(), ValidationState::Success);
        assert_eq!(report.total_issues, 0);
        assert_eq!(report.health_score, 100.0);
        assert_eq!(report.tables.len(), Table::DEPENDENCY_ORDER.len());
    }

    #[tokio::test]
    async fn test_orphans_self_parent_and_duplicates() {
        let store = seeded().await;

        let mut ledger = Ledger::new(&scope(), "Cash");
        ledger.parent_id = Some(master_id(&scope(), MasterKind::Group, "Cash-in-Hand"));
        RecordStore::<Ledger>::insert(&store, &ledger).await.unwrap();

        let mut group = Group::new(&scope(), "Loop");
        group.parent_id = Some(group.id);
        RecordStore::<Group>::insert(&store, &group).await.unwrap();

        RecordStore::<Voucher>::insert(&store, &voucher("g-1", "7", None)).await.unwrap();
        RecordStore::<Voucher>::insert(&store, &voucher("g-2", "7", None)).await.unwrap();

        let report = IntegrityValidator::new(&store)
            .validate(&scope(), &CancellationToken::new())
            .await;

        let ledgers = report.table(Table::Ledgers).unwrap();
        assert_eq!(ledgers.count(IssueKind::OrphanedReference), 1);
        assert_eq!(ledgers.issues[0].field.as_deref(), Some("parent_id"));

        let groups = report.table(Table::Groups).unwrap();
        assert_eq!(groups.count(IssueKind::SelfParent), 1);

        let vouchers = report.table(Table::Vouchers).unwrap();
        assert_eq!(vouchers.count(IssueKind::DuplicateNaturalKey), 1);
        assert!(report.health_score < 100.0);
    }

    #[tokio::test]
    async fn test_unlinked_children_are_not_orphans_and_amounts_checked() {
        let store = seeded().await;
        let v = voucher("g-1", "INV-001", Some(500));
        RecordStore::<Voucher>::insert(&store, &v).await.unwrap();
        RecordStore::<Voucher>::insert(&store, &voucher("g-2", "INV-002", Some(0))).await.unwrap();
        RecordStore::<Group>::insert(&store, &Group::new(&scope(), Ledger::DEFAULT_PARENT))
            .await
            .unwrap();
        RecordStore::<Ledger>::insert(&store, &Ledger::new(&scope(), "Cash")).await.unwrap();

        let entry = LedgerEntry {
            id: ledger_entry_id(&scope(), "g-1", "Cash", 0),
            company_id: scope().company_id,
            division_id: scope().division_id,
            voucher_id: None,
            voucher_guid: "g-1".into(),
            voucher_number: "INV-001".into(),
            voucher_type: Some("Sales".into()),
            ledger_name: "Cash".into(),
            ledger_id: master_id(&scope(), MasterKind::Ledger, "Cash"),
            amount: Decimal::from(-400),
            is_deemed_positive: true,
            is_party_ledger: false,
        };
        RecordStore::<LedgerEntry>::insert(&store, &entry).await.unwrap();

        let report = IntegrityValidator::new(&store)
            .validate(&scope(), &CancellationToken::new())
            .await;
        assert_eq!(report.table(Table::LedgerEntries).unwrap().issue_count, 0);
        assert_eq!(report.table(Table::Vouchers).unwrap().count(IssueKind::AmountMismatch), 1);

        let mut linked = entry.clone();
        linked.voucher_id = Some(v.id);
        linked.amount = Decimal::new(-49999, 2);
        RecordStore::<LedgerEntry>::update(&store, &linked).await.unwrap();

        let report = IntegrityValidator::new(&store)
            .validate(&scope(), &CancellationToken::new())
            .await;
        assert_eq!(report.total_issues, 0);
        assert_eq!(report.health_score, 100.0);
    }

    #[tokio::test]
    async fn test_unreadable_table_is_partial_failure() {
        let store = MemoryStore::new().fail_reads_from(Table::Ledgers);
        let company = Company::new(scope().company_id, "Acme");
        RecordStore::<Company>::insert(&store, &company).await.unwrap();

        let mut validator = IntegrityValidator::new(&store);
        let report = validator.validate(&scope(), &CancellationToken::new()).await;

        assert_eq!(report.status, ValidationState::PartialFailure);
        assert_eq!(report.tables.len(), Table::DEPENDENCY_ORDER.len());

        let ledgers = report.table(Table::Ledgers).unwrap();
        assert!(ledgers.error.as_deref().unwrap().contains("reads disabled"));
        assert_eq!(ledgers.records, 0);

        let companies = report.table(Table::Companies).unwrap();
        assert!(companies.error.is_none());
        assert_eq!(companies.records, 1);
        assert!(report
            .tables
            .iter()
            .filter(|t| t.table != Table::Ledgers)
            .all(|t| t.error.is_none()));
    }

    #[tokio::test]
    async fn test_cancelled_validation_is_partial_failure() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut validator = IntegrityValidator::new(&store);
        let report = validator.validate(&scope(), &cancel).await;
        assert_eq!(report.status, ValidationState::PartialFailure);
        assert!(report.tables.is_empty());
    }
}
