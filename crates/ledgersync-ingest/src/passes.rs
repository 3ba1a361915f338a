//! Standalone linker, reconciler and validator runs

use anyhow::{Context, Result};
use ledgersync_common::TenantScope;
use ledgersync_server::db::Store;
use ledgersync_server::ingest::{
    IntegrityValidator, LinkReport, Linker, ReconcileReport, Reconciler, SyncConfig, ValidationReport,
};
use tokio_util::sync::CancellationToken;

/// Link unlinked ledger and inventory entries until a pass links nothing.
///
/// Each pass walks every unlinked row in pages of `link_batch_size`;
/// `max_passes` caps the loop while rows keep arriving.
pub async fn link<S: Store>(
    store: &S,
    config: &SyncConfig,
    scope: &TenantScope,
    max_passes: usize,
    cancel: &CancellationToken,
) -> Result<Vec<LinkReport>> {
    let linker = Linker::new(store, config.link_batch_size, config.concurrency);
    let mut reports = Vec::new();

    for pass in 1..=max_passes.max(1) {
        let report = linker
            .run(scope, cancel)
            .await
            .with_context(|| format!("Linker pass {} failed", pass))?;
        let done = report.linked == 0 || report.cancelled;
        reports.push(report);
        if done {
            break;
        }
    }

    Ok(reports)
}

/// Fill the stored amounts of every voucher still missing them, until a
/// pass changes nothing.
pub async fn reconcile<S: Store>(
    store: &S,
    config: &SyncConfig,
    scope: &TenantScope,
    max_passes: usize,
    cancel: &CancellationToken,
) -> Result<Vec<ReconcileReport>> {
    let reconciler = Reconciler::new(store, config.reconcile_batch_size, config.concurrency);
    let mut reports = Vec::new();

    for pass in 1..=max_passes.max(1) {
        let report = reconciler
            .run(scope, cancel)
            .await
            .with_context(|| format!("Reconciler pass {} failed", pass))?;
        let done = report.reconciled == 0 || report.cancelled;
        reports.push(report);
        if done {
            break;
        }
    }

    Ok(reports)
}

pub async fn validate<S: Store>(store: &S, scope: &TenantScope, cancel: &CancellationToken) -> ValidationReport {
    IntegrityValidator::new(store).validate(scope, cancel).await
}
