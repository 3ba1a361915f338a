//! Ledgersync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, identity derivation, logging and error handling for the ledgersync
//! workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`LedgerSyncError`] and the [`Result`] alias
//! - **Identity**: deterministic row identifiers derived from `(tenant, name)`
//! - **Logging**: `tracing` subscriber setup shared by the server and the CLI
//! - **Types**: tenant scope, table catalogue and sync actions
//!
//! # Example
//!
//! ```
//! use ledgersync_common::identity::master_id;
//! use ledgersync_common::types::{MasterKind, TenantScope};
//! use uuid::Uuid;
//!
//! let scope = TenantScope::new(Uuid::nil(), Uuid::nil());
//! let a = master_id(&scope, MasterKind::Ledger, "Cash");
//! let b = master_id(&scope, MasterKind::Ledger, "  cash ");
//! assert_eq!(a, b);
//! ```

pub mod error;
pub mod identity;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LedgerSyncError, Result};
pub use types::{MasterKind, SyncAction, Table, TenantScope};
