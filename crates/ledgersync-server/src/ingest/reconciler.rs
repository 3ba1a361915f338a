//! Amount reconciler
//!
//! Voucher aggregates are derived from the linked ledger entries. Vouchers
//! arriving without them (or with zeros) get them computed here; vouchers
//! that already carry non-zero aggregates are left alone.
//!
//! A balanced voucher keeps `final_amount = 0` after reconciliation and so
//! stays a candidate. Candidates are therefore walked in id-keyed pages, and
//! a rewrite that changes nothing is counted as `unchanged`.

use futures::stream::{self, StreamExt};
use ledgersync_common::TenantScope;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{Store, StoreResult};
use crate::models::{LedgerEntry, VoucherAmounts};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub reconciled: usize,
    /// Aggregates already matched the entries
    pub unchanged: usize,
    /// Vouchers without linked entries, left untouched
    pub skipped_empty: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Aggregates of a voucher from its ledger entries.
///
/// `total` is the sum of magnitudes. `final` applies the polarity flag:
/// deemed-positive entries count as recorded, the rest as negative
/// magnitudes. Returns `None` for a voucher without entries.
pub fn compute_amounts(entries: &[LedgerEntry]) -> Option<VoucherAmounts> {
    if entries.is_empty() {
        return None;
    }

    let (total, final_amount) = entries.iter().fold((Decimal::ZERO, Decimal::ZERO), |(total, signed), e| {
        let contribution = if e.is_deemed_positive { e.amount } else { -e.amount.abs() };
        (total + e.amount.abs(), signed + contribution)
    });

    Some(VoucherAmounts {
        total,
        net: final_amount.abs(),
        basic: total,
        final_amount,
    })
}

enum RowOutcome {
    Reconciled,
    Unchanged,
    Empty,
    Failed,
    Skipped,
}

pub struct Reconciler<'a, S: Store> {
    store: &'a S,
    batch_size: usize,
    concurrency: usize,
}

impl<'a, S: Store> Reconciler<'a, S> {
    pub fn new(store: &'a S, batch_size: usize, concurrency: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    #[tracing::instrument(skip(self, scope, cancel), fields(scope = %scope))]
    pub async fn run(&self, scope: &TenantScope, cancel: &CancellationToken) -> StoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut after = None;

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let candidates = self
                .store
                .vouchers_missing_amounts(scope, after, self.batch_size)
                .await?;
            let Some(&last) = candidates.last() else {
                break;
            };
            let full_page = candidates.len() == self.batch_size;
            report.scanned += candidates.len();

            let outcomes: Vec<RowOutcome> = stream::iter(candidates)
                .map(|voucher_id| async move {
                    if cancel.is_cancelled() {
                        return RowOutcome::Skipped;
                    }
                    self.reconcile_voucher(voucher_id).await
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    RowOutcome::Reconciled => report.reconciled += 1,
                    RowOutcome::Unchanged => report.unchanged += 1,
                    RowOutcome::Empty => report.skipped_empty += 1,
                    RowOutcome::Failed => report.failed += 1,
                    RowOutcome::Skipped => report.cancelled = true,
                }
            }

            if !full_page {
                break;
            }
            after = Some(last);
        }

        tracing::info!(
            scanned = report.scanned,
            reconciled = report.reconciled,
            unchanged = report.unchanged,
            skipped_empty = report.skipped_empty,
            failed = report.failed,
            "Reconciler pass finished"
        );
        Ok(report)
    }

    async fn reconcile_voucher(&self, voucher_id: Uuid) -> RowOutcome {
        let entries = match self.store.ledger_entries_for_voucher(voucher_id).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(voucher = %voucher_id, error = %e, "Loading ledger entries failed");
                return RowOutcome::Failed;
            }
        };

        let Some(amounts) = compute_amounts(&entries) else {
            return RowOutcome::Empty;
        };

        match self.store.set_voucher_amounts(voucher_id, &amounts).await {
            Ok(true) => RowOutcome::Reconciled,
            Ok(false) => RowOutcome::Unchanged,
            Err(e) => {
                tracing::warn!(voucher = %voucher_id, error = %e, "Writing voucher amounts failed");
                RowOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::{self, MemoryStore, RecordStore};
    use crate::models::Voucher;
    use ledgersync_common::identity::{ledger_entry_id, master_id, voucher_id};
    use ledgersync_common::{MasterKind, Table};

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    fn voucher(guid: &str) -> Voucher {
        Voucher {
            id: voucher_id(&scope(), guid),
            company_id: scope().company_id,
            division_id: scope().division_id,
            guid: guid.into(),
            voucher_number: guid.to_uppercase(),
            voucher_type: Some("Journal".into()),
            voucher_type_id: None,
            date: None,
            reference: None,
            narration: None,
            party_ledger_name: None,
            party_ledger_id: None,
            total_amount: None,
            net_amount: None,
            basic_amount: None,
            final_amount: None,
            alter_id: None,
            is_cancelled: false,
        }
    }

    fn entry(voucher: &Voucher, ledger: &str, amount: i64, positive: bool) -> LedgerEntry {
        LedgerEntry {
            id: ledger_entry_id(&scope(), &voucher.guid, ledger, 0),
            company_id: scope().company_id,
            division_id: scope().division_id,
            voucher_id: Some(voucher.id),
            voucher_guid: voucher.guid.clone(),
            voucher_number: voucher.voucher_number.clone(),
            voucher_type: voucher.voucher_type.clone(),
            ledger_name: ledger.into(),
            ledger_id: master_id(&scope(), MasterKind::Ledger, ledger),
            amount: Decimal::from(amount),
            is_deemed_positive: positive,
            is_party_ledger: false,
        }
    }

    #[test]
    fn test_compute_amounts() {
        let v = voucher("g-1");
        let entries = vec![
            entry(&v, "Cash", 100, true),
            entry(&v, "Sales", -60, false),
            entry(&v, "Tax", -40, false),
        ];
        let amounts = compute_amounts(&entries).unwrap();

        assert_eq!(amounts.total, Decimal::from(200));
        assert_eq!(amounts.final_amount, Decimal::ZERO);
        assert_eq!(amounts.net, Decimal::ZERO);
        assert_eq!(amounts.basic, Decimal::from(200));
        assert!(compute_amounts(&[]).is_none());
    }

    #[tokio::test]
    async fn test_run_fills_missing_and_skips_empty() {
        let store = MemoryStore::new();
        let v = voucher("g-1");
        let empty = voucher("g-2");
        RecordStore::<Voucher>::insert(&store, &v).await.unwrap();
        RecordStore::<Voucher>::insert(&store, &empty).await.unwrap();
        for e in [entry(&v, "Cash", 100, true), entry(&v, "Sales", -60, false), entry(&v, "Tax", -40, false)] {
            RecordStore::<LedgerEntry>::insert(&store, &e).await.unwrap();
        }

        let reconciler = Reconciler::new(&store, 100, 4);
        let report = reconciler.run(&scope(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.reconciled, 1);
        assert_eq!(report.skipped_empty, 1);

        let stored: Voucher = db::get(&store, v.id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount, Some(Decimal::from(200)));
        assert_eq!(stored.final_amount, Some(Decimal::ZERO));

        // Balanced vouchers stay candidates; recomputing changes nothing.
        let again = reconciler.run(&scope(), &CancellationToken::new()).await.unwrap();
        assert_eq!(again.failed, 0);
        assert_eq!(again.reconciled, 0);
        assert_eq!(again.unchanged, 1);
        let stored_again: Voucher = db::get(&store, v.id).await.unwrap().unwrap();
        assert_eq!(stored_again.amounts(), stored.amounts());
    }

    #[tokio::test]
    async fn test_balanced_vouchers_beyond_first_page_reconciled() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..20 {
            let v = voucher(&format!("g-{i}"));
            RecordStore::<Voucher>::insert(&store, &v).await.unwrap();
            for e in [entry(&v, "Cash", 100, true), entry(&v, "Sales", -60, false), entry(&v, "Tax", -40, false)] {
                RecordStore::<LedgerEntry>::insert(&store, &e).await.unwrap();
            }
            ids.push(v.id);
        }

        let reconciler = Reconciler::new(&store, 5, 2);
        let first = reconciler.run(&scope(), &CancellationToken::new()).await.unwrap();
        assert_eq!(first.scanned, 20);
        assert_eq!(first.reconciled, 20);

        let second = reconciler.run(&scope(), &CancellationToken::new()).await.unwrap();
        assert_eq!(second.reconciled, 0);
        assert_eq!(second.unchanged, 20);

        for id in ids {
            let stored: Voucher = db::get(&store, id).await.unwrap().unwrap();
            assert_eq!(stored.total_amount, Some(Decimal::from(200)), "voucher {id}");
        }
    }

    #[tokio::test]
    async fn test_write_failure_counted() {
        let store = MemoryStore::new();
        let v = voucher("g-1");
        RecordStore::<Voucher>::insert(&store, &v).await.unwrap();
        RecordStore::<LedgerEntry>::insert(&store, &entry(&v, "Cash", 10, true)).await.unwrap();
        let store = store.fail_writes_to(Table::Vouchers);

        let report = Reconciler::new(&store, 100, 1)
            .run(&scope(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
    }
}
