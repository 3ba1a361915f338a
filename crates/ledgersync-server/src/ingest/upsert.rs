//! Idempotent upserts
//!
//! Every write goes through [`upsert`]: insert when absent, update when a
//! significant field differs, otherwise leave the row alone. Re-sending the
//! same document therefore only produces [`UpsertAction::Ignored`].

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::time::Duration;

use crate::db::{RecordStore, StoreError, StoreResult};
use crate::models::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Inserted,
    Updated,
    Ignored,
}

/// Insert, update or ignore one record.
pub async fn upsert<R, S>(store: &S, record: &R) -> StoreResult<UpsertAction>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    if let Some(existing) = store.fetch(record.id()).await? {
        return update_if_changed(store, record, &existing).await;
    }

    if store.insert(record).await? {
        return Ok(UpsertAction::Inserted);
    }

    // Lost the insert race; compare against the winner.
    match store.fetch(record.id()).await? {
        Some(existing) => update_if_changed(store, record, &existing).await,
        None => Err(StoreError::not_found(R::TABLE, record.id())),
    }
}

async fn update_if_changed<R, S>(store: &S, record: &R, existing: &R) -> StoreResult<UpsertAction>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    if !record.differs_from(existing) {
        return Ok(UpsertAction::Ignored);
    }
    store.update(&record.merged_for_update(existing)).await?;
    Ok(UpsertAction::Updated)
}

/// Outcome of one record in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub identifier: String,
    pub result: StoreResult<UpsertAction>,
}

/// Outcome of [`upsert_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
    pub errors: usize,
}

impl BatchReport {
    fn push(&mut self, identifier: String, result: StoreResult<UpsertAction>) {
        match &result {
            Ok(UpsertAction::Inserted) => self.inserted += 1,
            Ok(UpsertAction::Updated) => self.updated += 1,
            Ok(UpsertAction::Ignored) => self.ignored += 1,
            Err(_) => self.errors += 1,
        }
        self.items.push(BatchItem { identifier, result });
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.ignored += other.ignored;
        self.errors += other.errors;
        self.items.extend(other.items);
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}

/// Upsert many records of one table.
///
/// Records are written `concurrency` at a time in chunks of `batch_size`.
/// A failing record is counted and the rest continue; a chunk that exceeds
/// `timeout` marks its unfinished records as timed out.
pub async fn upsert_batch<R, S>(
    store: &S,
    records: &[R],
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
) -> BatchReport
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    let mut report = BatchReport::default();

    for chunk in records.chunks(batch_size.max(1)) {
        let mut pending: Vec<Option<StoreResult<UpsertAction>>> = (0..chunk.len()).map(|_| None).collect();

        let run = stream::iter(chunk.iter().enumerate())
            .map(|(index, record)| async move { (index, upsert(store, record).await) })
            .buffer_unordered(concurrency.max(1))
            .for_each(|(index, result)| {
                pending[index] = Some(result);
                futures::future::ready(())
            })
            .boxed();

        if tokio::time::timeout(timeout, run).await.is_err() {
            tracing::warn!(table = %R::TABLE, size = chunk.len(), ?timeout, "Store batch timed out");
        }

        for (record, result) in chunk.iter().zip(pending) {
            let result = result.unwrap_or(Err(StoreError::Timeout(timeout)));
            if let Err(e) = &result {
                tracing::warn!(table = %R::TABLE, record = %record.display_key(), error = %e, "Upsert failed");
            }
            report.push(record.display_key(), result);
        }
    }

    tracing::debug!(
        table = %R::TABLE,
        inserted = report.inserted,
        updated = report.updated,
        ignored = report.ignored,
        errors = report.errors,
        "Batch upserted"
    );
    report
}
