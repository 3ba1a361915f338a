//! Ledgersync Ingest Library
//!
//! Batch-side tooling around the ledgersync pipeline: ingest exported files,
//! run the linker and reconciler passes by hand and write their reports.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ledgersync_common::TenantScope;
//! use ledgersync_ingest::files;
//! use ledgersync_server::db::MemoryStore;
//! use ledgersync_server::ingest::{IngestPipeline, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = IngestPipeline::new(Arc::new(MemoryStore::new()), SyncConfig::default());
//!     let scope = TenantScope::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
//!     let reports = files::ingest_files(&pipeline, &["./exports/daybook.xml".into()], scope, true).await?;
//!     println!("{} files ingested", reports.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod files;
pub mod passes;
pub mod report;
