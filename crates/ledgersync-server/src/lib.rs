//! Ledgersync Server Library
//!
//! Ingests accounting-export XML into a normalized relational store and
//! keeps the resulting graph consistent.
//!
//! # Overview
//!
//! - **Ingestion**: master resolution, voucher extraction and idempotent
//!   upserts for one payload ([`ingest::IngestPipeline`])
//! - **Full sync**: table-by-table pulls from the source system recorded as
//!   sync jobs ([`ingest::FullSyncOrchestrator`])
//! - **Repair passes**: the relationship linker and the amount reconciler
//! - **Validation**: a read-only referential integrity audit with a health
//!   score ([`ingest::IntegrityValidator`])
//!
//! # Stores
//!
//! Everything is written against the [`db::Store`] trait. [`db::PgStore`]
//! backs the server on PostgreSQL; [`db::MemoryStore`] serves tests and CLI
//! dry runs.
//!
//! # Example
//!
//! ```no_run
//! use ledgersync_common::TenantScope;
//! use ledgersync_server::db::MemoryStore;
//! use ledgersync_server::ingest::{IngestPipeline, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn run(payload: &str, scope: TenantScope) {
//! let pipeline = IngestPipeline::new(Arc::new(MemoryStore::new()), SyncConfig::default());
//! let report = pipeline.ingest(payload, scope, true).await;
//! println!("{} records", report.outcomes.len());
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;

pub use error::AppError;
