//! Live ingestion entry point
//!
//! One call takes a complete export payload for one tenant scope through
//! master resolution, voucher extraction and the upsert engine, and
//! optionally through the linker and reconciler afterwards.

use futures::stream::{self, StreamExt};
use ledgersync_common::identity::normalize_name;
use ledgersync_common::{MasterKind, Table, TenantScope};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::config::SyncConfig;
use super::extractor::Fragment;
use super::linker::{LinkReport, Linker};
use super::master_blocks::extract_masters;
use super::masters::{LedgerHints, MasterResolution, MasterResolver, ResolveError};
use super::outcome::{IngestReport, OutcomeAction, RecordOutcome};
use super::reconciler::{ReconcileReport, Reconciler};
use super::transactions::{extract_vouchers, ParsedVoucher, SkippedVoucher, VoucherBlock};
use super::upsert::upsert;
use crate::db::{RecordStore, Store, StoreError};
use crate::models::Record;

pub struct IngestPipeline<S: Store> {
    store: Arc<S>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl<S: Store> Clone for IngestPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: Store> IngestPipeline<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between vouchers once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Ingest one payload.
    ///
    /// Record-level failures become `error` outcomes; the call itself never
    /// fails. With `live` set, the linker and reconciler run for the scope
    /// once all upserts are done.
    #[tracing::instrument(skip(self, payload, scope), fields(scope = %scope, bytes = payload.len()))]
    pub async fn ingest(&self, payload: &str, scope: TenantScope, live: bool) -> IngestReport {
        let fragment = Fragment::new(payload);

        let mut outcomes = self.ingest_masters(&fragment, scope).await;
        outcomes.extend(self.ingest_vouchers(&fragment, scope).await);

        let mut report = IngestReport::new(outcomes);
        if live {
            let (link, reconcile) = self.run_passes(&scope).await;
            report.link = link;
            report.reconcile = reconcile;
        }

        tracing::info!(
            inserted = report.count(OutcomeAction::Inserted),
            updated = report.count(OutcomeAction::Updated),
            ignored = report.count(OutcomeAction::Ignored),
            created_master = report.count(OutcomeAction::CreatedMaster),
            errors = report.count(OutcomeAction::Error),
            "Ingestion finished"
        );
        report
    }

    /// Resolve the master export blocks of a payload, parents first.
    pub async fn ingest_masters(&self, payload: &Fragment<'_>, scope: TenantScope) -> Vec<RecordOutcome> {
        let resolver = MasterResolver::new(self.store.as_ref(), scope);
        let mut outcomes = Vec::new();

        for block in extract_masters(payload) {
            let outcome = match block.resolve(&resolver).await {
                Ok(resolution) => RecordOutcome::master(&resolution),
                Err(e) => {
                    tracing::warn!(kind = %block.kind(), name = %block.name(), error = %e, "Master block failed");
                    RecordOutcome::master_error(block.kind(), block.name(), e)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Extract and write every voucher of a payload, `concurrency` at a time.
    pub async fn ingest_vouchers(&self, payload: &Fragment<'_>, scope: TenantScope) -> Vec<RecordOutcome> {
        stream::iter(extract_vouchers(payload))
            .map(|block| async move {
                match block {
                    VoucherBlock::Skipped(skipped) => vec![skipped_outcome(&skipped)],
                    VoucherBlock::Parsed(voucher) => {
                        let key = voucher.voucher_number.clone();
                        if self.cancel.is_cancelled() {
                            return vec![RecordOutcome::error(Table::Vouchers, key, "voucher", "ingestion cancelled")];
                        }
                        self.ingest_voucher(*voucher, scope).await
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .flat_map(stream::iter)
            .collect()
            .await
    }

    /// Resolve the masters a voucher references, then upsert it and its
    /// entries. Entries are written unlinked when the voucher write fails
    /// so the linker can attach them later.
    ///
    /// Every store call is bounded by the store batch timeout on its own, so
    /// a late timeout never hides rows already committed for the voucher.
    async fn ingest_voucher(&self, voucher: ParsedVoucher, scope: TenantScope) -> Vec<RecordOutcome> {
        let timeout = self.config.store_batch_timeout();
        let mut outcomes = self.resolve_references(&voucher, scope).await;

        let rows = voucher.into_rows(&scope, true);
        let voucher_ok = match bounded(timeout, upsert(self.store.as_ref(), &rows.voucher)).await {
            Ok(action) => {
                outcomes.push(RecordOutcome::new(
                    Table::Vouchers,
                    action.into(),
                    rows.voucher.display_key(),
                    "voucher",
                ));
                true
            }
            Err(e) => {
                tracing::warn!(guid = %rows.voucher.guid, error = %e, "Voucher upsert failed");
                outcomes.push(RecordOutcome::error(Table::Vouchers, rows.voucher.display_key(), "voucher", e));
                false
            }
        };

        for mut entry in rows.ledger_entries {
            if !voucher_ok {
                entry.voucher_id = None;
            }
            outcomes.push(write_row(self.store.as_ref(), &entry, "ledger_entry", timeout).await);
        }
        for mut entry in rows.inventory_entries {
            if !voucher_ok {
                entry.voucher_id = None;
            }
            outcomes.push(write_row(self.store.as_ref(), &entry, "inventory_entry", timeout).await);
        }
        outcomes
    }

    /// Ensure every master a voucher names exists. Each name is resolved
    /// once per voucher.
    pub async fn resolve_references(&self, voucher: &ParsedVoucher, scope: TenantScope) -> Vec<RecordOutcome> {
        let resolver = MasterResolver::new(self.store.as_ref(), scope);
        let timeout = self.config.store_batch_timeout();
        let mut seen: HashSet<(MasterKind, String)> = HashSet::new();
        let mut first = |kind: MasterKind, name: &str| seen.insert((kind, normalize_name(name)));
        let mut outcomes = Vec::new();

        if let Some(name) = voucher.voucher_type.as_deref() {
            if first(MasterKind::VoucherType, name) {
                outcomes.push(resolved(MasterKind::VoucherType, name, bounded(timeout, resolver.ensure_voucher_type(name)).await));
            }
        }
        if let Some(name) = voucher.party_ledger_name.as_deref() {
            if first(MasterKind::Ledger, name) {
                outcomes.push(resolved(MasterKind::Ledger, name, bounded(timeout, resolver.ensure_ledger(name, &voucher.party)).await));
            }
        }
        for entry in &voucher.ledger_entries {
            let name = entry.ledger_name.as_str();
            if first(MasterKind::Ledger, name) {
                let hints = LedgerHints::default();
                outcomes.push(resolved(MasterKind::Ledger, name, bounded(timeout, resolver.ensure_ledger(name, &hints)).await));
            }
        }
        for entry in &voucher.inventory_entries {
            let name = entry.stock_item_name.as_str();
            if first(MasterKind::StockItem, name) {
                let hints = entry.stock_item_hints();
                outcomes.push(resolved(MasterKind::StockItem, name, bounded(timeout, resolver.ensure_stock_item(name, &hints)).await));
            }
            if let Some(godown) = entry.godown_name.as_deref() {
                if first(MasterKind::Godown, godown) {
                    outcomes.push(resolved(MasterKind::Godown, godown, bounded(timeout, resolver.ensure_godown(godown)).await));
                }
            }
        }
        outcomes
    }

    /// Run the linker and then the reconciler for a scope.
    ///
    /// A pass that cannot read its candidates is logged and left out of the
    /// result.
    pub async fn run_passes(&self, scope: &TenantScope) -> (Option<LinkReport>, Option<ReconcileReport>) {
        let link = self.link(scope).await;
        let reconcile = self.reconcile(scope).await;
        (link, reconcile)
    }

    pub async fn link(&self, scope: &TenantScope) -> Option<LinkReport> {
        let linker = Linker::new(self.store.as_ref(), self.config.link_batch_size, self.config.concurrency);
        linker
            .run(scope, &self.cancel)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Linker pass failed"))
            .ok()
    }

    pub async fn reconcile(&self, scope: &TenantScope) -> Option<ReconcileReport> {
        let reconciler = Reconciler::new(
            self.store.as_ref(),
            self.config.reconcile_batch_size,
            self.config.concurrency,
        );
        reconciler
            .run(scope, &self.cancel)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Reconciler pass failed"))
            .ok()
    }
}

fn resolved(kind: MasterKind, name: &str, result: Result<MasterResolution, ResolveError>) -> RecordOutcome {
    match result {
        Ok(resolution) => RecordOutcome::master(&resolution),
        Err(e) => {
            tracing::warn!(kind = %kind, name = %name, error = %e, "Master resolution failed");
            RecordOutcome::master_error(kind, name, e)
        }
    }
}

fn skipped_outcome(skipped: &SkippedVoucher) -> RecordOutcome {
    let identifier = skipped
        .voucher_number
        .clone()
        .unwrap_or_else(|| format!("#{}", skipped.index));
    RecordOutcome::error(Table::Vouchers, identifier, "voucher", &skipped.reason)
}

/// Run one store operation, failing it with [`StoreError::Timeout`] past `limit`.
async fn bounded<T, E, F>(limit: Duration, op: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    tokio::time::timeout(limit, op)
        .await
        .unwrap_or_else(|_| Err(StoreError::Timeout(limit).into()))
}

async fn write_row<R, S>(store: &S, record: &R, kind: &str, timeout: Duration) -> RecordOutcome
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    match bounded(timeout, upsert(store, record)).await {
        Ok(action) => RecordOutcome::new(R::TABLE, action.into(), record.display_key(), kind),
        Err(e) => {
            tracing::warn!(table = %R::TABLE, record = %record.display_key(), error = %e, "Upsert failed");
            RecordOutcome::error(R::TABLE, record.display_key(), kind, e)
        }
    }
}
