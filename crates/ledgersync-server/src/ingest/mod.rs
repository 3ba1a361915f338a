//! Ingestion, reconciliation and validation pipeline
//!
//! Leaf-first:
//!
//! - [`extractor`]: delimiter-scanning tag extraction over raw payloads
//! - [`normalize`]: compact dates, decimals with unit suffixes, flags
//! - [`masters`]: deterministic master ids and create-if-absent
//! - [`transactions`] / [`master_blocks`]: payload blocks into typed values
//! - [`upsert`]: insert, update or ignore per record
//! - [`linker`] / [`reconciler`]: re-runnable repair passes over stored rows
//! - [`validator`]: read-only referential integrity audit
//! - [`pipeline`] / [`orchestrator`]: live ingestion and full sync entry points
//! - [`jobs`]: sync job recording

pub mod config;
pub mod extractor;
pub mod jobs;
pub mod linker;
pub mod master_blocks;
pub mod masters;
pub mod normalize;
pub mod orchestrator;
pub mod outcome;
pub mod pipeline;
pub mod reconciler;
pub mod source;
pub mod transactions;
pub mod upsert;
pub mod validator;

pub use config::SyncConfig;
pub use linker::{LinkReport, Linker};
pub use masters::{MasterOutcome, MasterResolution, MasterResolver};
pub use orchestrator::{FullSyncOrchestrator, SyncOutcome, SyncRequest};
pub use outcome::{IngestReport, IngestSummary, OutcomeAction, RecordOutcome};
pub use pipeline::IngestPipeline;
pub use reconciler::{ReconcileReport, Reconciler};
pub use source::{HttpSourceClient, SourceClient, SourceError, StaticSource};
pub use upsert::{upsert, UpsertAction};
pub use validator::{IntegrityValidator, ValidationReport, ValidationState};
