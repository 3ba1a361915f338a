//! Relationship linker
//!
//! Child rows written before their voucher (or by a path that only knew the
//! voucher number) stay unlinked. This pass looks the voucher up by its
//! natural key and sets the foreign key. It only ever touches rows that are
//! still unlinked, so it can be re-run at any time and converges.
//!
//! Candidates are read in pages of `batch_size` keyed on the row id, so rows
//! that cannot be resolved never hide the ones after them.

use futures::stream::{self, StreamExt};
use ledgersync_common::{Table, TenantScope};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::db::{Store, StoreResult, UnlinkedChild};

/// Child tables carrying a voucher link.
pub const CHILD_TABLES: [Table; 2] = [Table::LedgerEntries, Table::InventoryEntries];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub scanned: usize,
    pub linked: usize,
    /// No voucher carries the number
    pub unresolved: usize,
    /// Several vouchers match even after narrowing by type
    pub ambiguous: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl LinkReport {
    fn add(&mut self, other: LinkReport) {
        self.scanned += other.scanned;
        self.linked += other.linked;
        self.unresolved += other.unresolved;
        self.ambiguous += other.ambiguous;
        self.failed += other.failed;
        self.cancelled |= other.cancelled;
    }
}

enum RowOutcome {
    Linked,
    AlreadyLinked,
    Unresolved,
    Ambiguous,
    Failed,
    Skipped,
}

pub struct Linker<'a, S: Store> {
    store: &'a S,
    batch_size: usize,
    concurrency: usize,
}

impl<'a, S: Store> Linker<'a, S> {
    pub fn new(store: &'a S, batch_size: usize, concurrency: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Walk the unlinked rows of every child table in the scope once.
    #[tracing::instrument(skip(self, scope, cancel), fields(scope = %scope))]
    pub async fn run(&self, scope: &TenantScope, cancel: &CancellationToken) -> StoreResult<LinkReport> {
        let mut report = LinkReport::default();
        for table in CHILD_TABLES {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.add(self.link_table(scope, table, cancel).await?);
        }

        tracing::info!(
            scanned = report.scanned,
            linked = report.linked,
            unresolved = report.unresolved,
            ambiguous = report.ambiguous,
            failed = report.failed,
            "Linker pass finished"
        );
        Ok(report)
    }

    async fn link_table(
        &self,
        scope: &TenantScope,
        table: Table,
        cancel: &CancellationToken,
    ) -> StoreResult<LinkReport> {
        let mut report = LinkReport::default();
        let mut after = None;

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let children = self
                .store
                .unlinked_children(scope, table, after, self.batch_size)
                .await?;
            let Some(last) = children.last().map(|c| c.id) else {
                break;
            };
            let full_page = children.len() == self.batch_size;
            report.scanned += children.len();

            let outcomes: Vec<RowOutcome> = stream::iter(children)
                .map(|child| async move {
                    if cancel.is_cancelled() {
                        return RowOutcome::Skipped;
                    }
                    self.link_child(scope, &child).await
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    RowOutcome::Linked => report.linked += 1,
                    RowOutcome::AlreadyLinked => {}
                    RowOutcome::Unresolved => report.unresolved += 1,
                    RowOutcome::Ambiguous => report.ambiguous += 1,
                    RowOutcome::Failed => report.failed += 1,
                    RowOutcome::Skipped => report.cancelled = true,
                }
            }

            if !full_page {
                break;
            }
            after = Some(last);
        }

        tracing::debug!(table = %table, scanned = report.scanned, linked = report.linked, "Linked child table");
        Ok(report)
    }

    async fn link_child(&self, scope: &TenantScope, child: &UnlinkedChild) -> RowOutcome {
        let candidates = match self.store.vouchers_by_number(scope, &child.voucher_number).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(child = %child.id, error = %e, "Voucher lookup failed");
                return RowOutcome::Failed;
            }
        };

        let parent = match candidates.as_slice() {
            [] => return RowOutcome::Unresolved,
            [only] => only.id,
            many => {
                let wanted = child.voucher_type.as_deref().map(str::trim);
                let narrowed: Vec<_> = many
                    .iter()
                    .filter(|v| {
                        wanted.is_some_and(|w| {
                            v.voucher_type.as_deref().is_some_and(|t| t.trim().eq_ignore_ascii_case(w))
                        })
                    })
                    .collect();
                match narrowed.as_slice() {
                    [only] => only.id,
                    [] => return RowOutcome::Unresolved,
                    _ => {
                        tracing::debug!(
                            child = %child.id,
                            voucher_number = %child.voucher_number,
                            candidates = many.len(),
                            "Ambiguous voucher number"
                        );
                        return RowOutcome::Ambiguous;
                    }
                }
            }
        };

        match self.store.link_child(child.table, child.id, parent).await {
            Ok(true) => RowOutcome::Linked,
            Ok(false) => RowOutcome::AlreadyLinked,
            Err(e) => {
                tracing::warn!(child = %child.id, error = %e, "Link write failed");
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
    use crate::models::{LedgerEntry, Voucher};
    use ledgersync_common::identity::{ledger_entry_id, master_id, voucher_id};
    use ledgersync_common::MasterKind;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    fn voucher(guid: &str, number: &str, voucher_type: &str) -> Voucher {
        Voucher {
            id: voucher_id(&scope(), guid),
            company_id: scope().company_id,
            division_id: scope().division_id,
            guid: guid.into(),
            voucher_number: number.into(),
            voucher_type: Some(voucher_type.into()),
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

    fn orphan(guid: &str, number: &str, voucher_type: &str) -> LedgerEntry {
        LedgerEntry {
            id: ledger_entry_id(&scope(), guid, "Cash", 0),
            company_id: scope().company_id,
            division_id: scope().division_id,
            voucher_id: None,
            voucher_guid: guid.into(),
            voucher_number: number.into(),
            voucher_type: Some(voucher_type.into()),
            ledger_name: "Cash".into(),
            ledger_id: master_id(&scope(), MasterKind::Ledger, "Cash"),
            amount: Decimal::from(100),
            is_deemed_positive: true,
            is_party_ledger: false,
        }
    }

    async fn insert_voucher(store: &MemoryStore, v: &Voucher) {
        RecordStore::<Voucher>::insert(store, v).await.unwrap();
    }

    async fn insert_entry(store: &MemoryStore, e: &LedgerEntry) {
        RecordStore::<LedgerEntry>::insert(store, e).await.unwrap();
    }

    #[tokio::test]
    async fn test_links_and_converges() {
        let store = MemoryStore::new();
        let v = voucher("g-1", "INV-001", "Sales");
        insert_voucher(&store, &v).await;
        insert_entry(&store, &orphan("g-1", "INV-001", "Sales")).await;
        insert_entry(&store, &orphan("g-x", "INV-404", "Sales")).await;

        let linker = Linker::new(&store, 100, 4);
        let cancel = CancellationToken::new();

        let first = linker.run(&scope(), &cancel).await.unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.linked, 1);
        assert_eq!(first.unresolved, 1);

        let second = linker.run(&scope(), &cancel).await.unwrap();
        assert_eq!(second.linked, 0);
        assert_eq!(second.scanned, 1);

        let entry: LedgerEntry = db::get(&store, ledger_entry_id(&scope(), "g-1", "Cash", 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.voucher_id, Some(v.id));
    }

    #[tokio::test]
    async fn test_duplicate_numbers_narrowed_by_type() {
        let store = MemoryStore::new();
        let receipt = voucher("g-r", "7", "Receipt");
        insert_voucher(&store, &receipt).await;
        insert_voucher(&store, &voucher("g-p", "7", "Payment")).await;
        insert_voucher(&store, &voucher("g-p2", "8", "Payment")).await;
        insert_voucher(&store, &voucher("g-p3", "8", "Payment")).await;
        insert_entry(&store, &orphan("g-r", "7", "receipt")).await;
        insert_entry(&store, &orphan("g-p2", "8", "Payment")).await;

        let report = Linker::new(&store, 100, 2)
            .run(&scope(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.linked, 1);
        assert_eq!(report.ambiguous, 1);
        let entry: LedgerEntry = db::get(&store, ledger_entry_id(&scope(), "g-r", "Cash", 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.voucher_id, Some(receipt.id));
    }

    #[tokio::test]
    async fn test_unresolvable_rows_do_not_starve_later_pages() {
        let store = MemoryStore::new();
        let mut resolvable = Vec::new();
        for i in 0..20 {
            let guid = format!("g-{i}");
            let number = format!("INV-{i:03}");
            if i % 2 == 0 {
                insert_voucher(&store, &voucher(&guid, &number, "Sales")).await;
                resolvable.push(ledger_entry_id(&scope(), &guid, "Cash", 0));
            }
            insert_entry(&store, &orphan(&guid, &number, "Sales")).await;
        }

        let linker = Linker::new(&store, 5, 2);
        let cancel = CancellationToken::new();

        let first = linker.run(&scope(), &cancel).await.unwrap();
        assert_eq!(first.scanned, 20);
        assert_eq!(first.linked, 10);
        assert_eq!(first.unresolved, 10);

        let second = linker.run(&scope(), &cancel).await.unwrap();
        assert_eq!(second.linked, 0);
        assert_eq!(second.scanned, 10);

        for id in resolvable {
            let entry: LedgerEntry = db::get(&store, id).await.unwrap().unwrap();
            assert!(entry.voucher_id.is_some(), "entry {id} left unlinked");
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = MemoryStore::new();
        insert_entry(&store, &orphan("g-1", "INV-001", "Sales")).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Linker::new(&store, 100, 1).run(&scope(), &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.linked, 0);
    }
}
