//! Feature modules implementing the ledgersync API
//!
//! Each feature is a vertical slice with its own routes:
//!
//! - **ingest**: live ingestion of one export payload
//! - **sync**: full sync, health check and metadata actions
//! - **validate**: referential integrity report for a tenant scope
//! - **jobs**: sync job listing and lookup

pub mod ingest;
pub mod jobs;
pub mod shared;
pub mod sync;
pub mod validate;

use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::db::Store;
use crate::ingest::{FullSyncOrchestrator, IngestPipeline, SourceClient, SyncConfig};

/// Shared state for all routes
pub struct AppState<S: Store> {
    pub pipeline: IngestPipeline<S>,
    pub source: Arc<dyn SourceClient>,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            source: Arc::clone(&self.source),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, source: Arc<dyn SourceClient>, config: SyncConfig) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            pipeline: IngestPipeline::new(store, config).with_cancellation(shutdown.child_token()),
            source,
            shutdown,
        }
    }

    pub fn store(&self) -> &S {
        self.pipeline.store()
    }

    pub fn orchestrator(&self) -> FullSyncOrchestrator<S> {
        FullSyncOrchestrator::new(self.pipeline.clone(), Arc::clone(&self.source))
            .with_cancellation(self.shutdown.child_token())
    }
}

/// Creates the API router with all feature routes mounted
///
/// - `/ingest` - Live ingestion
/// - `/sync` - Full sync actions
/// - `/validate` - Integrity validation
/// - `/jobs` - Sync jobs
pub fn router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .merge(ingest::ingest_routes())
        .merge(sync::sync_routes())
        .merge(validate::validate_routes())
        .nest("/jobs", jobs::jobs_routes())
}
