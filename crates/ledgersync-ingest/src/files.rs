//! Ingestion of exported payload files

use anyhow::{Context, Result};
use ledgersync_common::TenantScope;
use ledgersync_server::db::Store;
use ledgersync_server::ingest::{IngestPipeline, IngestReport, OutcomeAction};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Report of one ingested file
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub bytes: usize,
    pub report: IngestReport,
}

/// Read an export file.
///
/// Exports are not always valid UTF-8; invalid sequences are replaced
/// rather than rejecting the whole file.
pub async fn read_payload(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Payload is not valid UTF-8, replacing invalid bytes");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

/// Ingest `paths` one after another into `scope`.
///
/// Files are processed in the given order so masters exported in an earlier
/// file are already resolved when a later file's vouchers reference them.
/// With `live`, the linker and reconciler run after every file.
pub async fn ingest_files<S: Store>(
    pipeline: &IngestPipeline<S>,
    paths: &[PathBuf],
    scope: TenantScope,
    live: bool,
) -> Result<Vec<FileReport>> {
    let mut reports = Vec::with_capacity(paths.len());

    for path in paths {
        let payload = read_payload(path).await?;
        info!(path = %path.display(), bytes = payload.len(), "Ingesting file");

        let report = pipeline.ingest(&payload, scope, live).await;
        info!(
            path = %path.display(),
            records = report.outcomes.len(),
            errors = report.count(OutcomeAction::Error),
            "File ingested"
        );

        reports.push(FileReport {
            path: path.clone(),
            bytes: payload.len(),
            report,
        });
    }

    Ok(reports)
}
