//! End-to-end ingestion tests against the in-memory store
//!
//! Coverage includes:
//! - The INV-001 sales voucher: auto-created masters, voucher and children
//! - Idempotent re-ingestion
//! - Live mode running the linker and reconciler
//! - Full sync through a static source, followed by validation

#![allow(clippy::unwrap_used, clippy::expect_used)]

use ledgersync_common::identity::{master_id, voucher_id};
use ledgersync_common::{MasterKind, Table};
use ledgersync_server::db::{self, Store};
use ledgersync_server::ingest::{
    FullSyncOrchestrator, IntegrityValidator, OutcomeAction, StaticSource, ValidationState,
};
use ledgersync_server::models::{InventoryEntry, JobStatus, Ledger, LedgerEntry, StockItem, Voucher};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod common;
use common::{pipeline, scope, seeded_store, INV_001, INV_002};

// ============================================================================
// Single payload
// ============================================================================

#[tokio::test]
async fn test_inv_001_creates_masters_and_children() {
    let pipeline = pipeline(seeded_store().await);
    let report = pipeline.ingest(INV_001, scope(), false).await;

    assert_eq!(report.errors().count(), 0, "unexpected errors: {:?}", report.outcomes);
    assert_eq!(report.count(OutcomeAction::CreatedMaster), 3);
    assert_eq!(report.summary.table_count(Table::Ledgers, OutcomeAction::CreatedMaster), 2);
    assert_eq!(report.summary.table_count(Table::StockItems, OutcomeAction::CreatedMaster), 1);
    assert_eq!(report.summary.table_count(Table::Vouchers, OutcomeAction::Inserted), 1);
    assert_eq!(report.summary.table_count(Table::LedgerEntries, OutcomeAction::Inserted), 2);
    assert_eq!(report.summary.table_count(Table::InventoryEntries, OutcomeAction::Inserted), 1);

    let store = pipeline.store();
    let ledgers: Vec<Ledger> = db::list(store, &scope()).await.unwrap();
    let mut names: Vec<_> = ledgers.iter().map(|l| l.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Cash", "Sales"]);

    let widget: StockItem = db::get(store, master_id(&scope(), MasterKind::StockItem, "Widget"))
        .await
        .unwrap()
        .expect("Widget should have been created");
    assert_eq!(widget.name, "Widget");

    let voucher: Voucher = db::get(store, voucher_id(&scope(), "V1"))
        .await
        .unwrap()
        .expect("voucher V1 should exist");
    assert_eq!(voucher.voucher_number, "INV-001");
    assert_eq!(voucher.narration.as_deref(), Some("Counter sale & delivery"));

    let entries: Vec<LedgerEntry> = db::list(store, &scope()).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|e| e.amount).sum::<Decimal>(), Decimal::ZERO);
    assert!(entries.iter().all(|e| e.voucher_id == Some(voucher.id)));

    let inventory: Vec<InventoryEntry> = db::list(store, &scope()).await.unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].stock_item_id, widget.id);
    assert_eq!(inventory[0].quantity, Decimal::from(10));
    assert_eq!(inventory[0].rate, Decimal::from(50));
    assert_eq!(inventory[0].amount, Decimal::from(500));
}

#[tokio::test]
async fn test_voucher_type_is_a_fourth_master() {
    let pipeline = pipeline(seeded_store().await);
    let report = pipeline.ingest(INV_002, scope(), false).await;

    assert_eq!(report.errors().count(), 0, "unexpected errors: {:?}", report.outcomes);
    assert_eq!(report.count(OutcomeAction::CreatedMaster), 4);
    assert_eq!(report.summary.table_count(Table::VoucherTypes, OutcomeAction::CreatedMaster), 1);
    assert_eq!(report.summary.table_count(Table::Ledgers, OutcomeAction::CreatedMaster), 2);

    let voucher: Voucher = db::get(pipeline.store(), voucher_id(&scope(), "V2"))
        .await
        .unwrap()
        .expect("voucher V2 should exist");
    assert_eq!(voucher.voucher_type.as_deref(), Some("Sales"));
    assert_eq!(
        voucher.voucher_type_id,
        Some(master_id(&scope(), MasterKind::VoucherType, "Sales"))
    );
}

#[tokio::test]
async fn test_reingest_is_ignored_everywhere() {
    let pipeline = pipeline(seeded_store().await);
    pipeline.ingest(INV_001, scope(), false).await;

    let again = pipeline.ingest(INV_001, scope(), false).await;
    assert!(!again.outcomes.is_empty());
    assert!(
        again.outcomes.iter().all(|o| o.action == OutcomeAction::Ignored),
        "expected only ignored outcomes: {:?}",
        again.outcomes
    );

    let store = pipeline.store();
    assert_eq!(store.count(&scope(), Table::Ledgers).await.unwrap(), 2);
    assert_eq!(store.count(&scope(), Table::StockItems).await.unwrap(), 1);
    assert_eq!(store.count(&scope(), Table::Vouchers).await.unwrap(), 1);
    assert_eq!(store.count(&scope(), Table::LedgerEntries).await.unwrap(), 2);
    assert_eq!(store.count(&scope(), Table::InventoryEntries).await.unwrap(), 1);
}

#[tokio::test]
async fn test_live_ingest_reconciles_amounts() {
    let pipeline = pipeline(seeded_store().await);
    let report = pipeline.ingest(INV_001, scope(), true).await;

    let reconcile = report.reconcile.expect("live ingestion runs the reconciler");
    assert_eq!(reconcile.reconciled, 1);
    assert_eq!(reconcile.failed, 0);

    let voucher: Voucher = db::get(pipeline.store(), voucher_id(&scope(), "V1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(voucher.total_amount, Some(Decimal::from(1000)));
    assert_eq!(voucher.final_amount, Some(Decimal::ZERO));

    let report = IntegrityValidator::new(pipeline.store())
        .validate(&scope(), &CancellationToken::new())
        .await;
    assert_eq!(report.status, ValidationState::Success);
    assert_eq!(report.total_issues, 0, "unexpected issues: {:?}", report.tables);
    assert_eq!(report.health_score, 100.0);
}

#[tokio::test]
async fn test_other_scope_is_untouched() {
    let store = seeded_store().await;
    let pipeline = pipeline(store);
    pipeline.ingest(INV_001, scope(), false).await;

    let other = ledgersync_common::TenantScope::new(scope().company_id, uuid::Uuid::from_u128(99));
    assert_eq!(pipeline.store().count(&other, Table::Vouchers).await.unwrap(), 0);
    assert_eq!(pipeline.store().count(&other, Table::Ledgers).await.unwrap(), 0);
}

// ============================================================================
// Full sync
// ============================================================================

#[tokio::test]
async fn test_full_sync_then_validate() {
    let store = seeded_store().await;
    let source = StaticSource::new().with_table(Table::Vouchers, INV_001);
    let orchestrator = FullSyncOrchestrator::new(pipeline(store), Arc::new(source));

    let report = orchestrator
        .full_sync(&scope(), &[Table::Vouchers, Table::LedgerEntries, Table::InventoryEntries])
        .await
        .unwrap();

    assert_eq!(report.job.status, JobStatus::Completed);
    assert!(report.failed_tables.is_empty());
    assert_eq!(report.job.created_master, 3);
    let link = report.link.expect("full sync runs the linker");
    assert_eq!(link.linked, 3);
    assert_eq!(link.unresolved, 0);
    assert_eq!(report.job.reconciled, 1);

    let stored = orchestrator.store().get_job(report.job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.completed_at.is_some());

    let validation = IntegrityValidator::new(orchestrator.store())
        .validate(&scope(), &CancellationToken::new())
        .await;
    assert_eq!(validation.total_issues, 0, "unexpected issues: {:?}", validation.tables);
}

#[tokio::test]
async fn test_empty_scope_validates_clean() {
    let store = seeded_store().await;
    let report = IntegrityValidator::new(store.as_ref())
        .validate(&scope(), &CancellationToken::new())
        .await;

    assert_eq!(report.status, ValidationState::Success);
    assert_eq!(report.total_issues, 0);
    assert_eq!(report.health_score, 100.0);
}
