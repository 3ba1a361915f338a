//! Database models
//!
//! Every persisted row type implements [`Record`], which gives the store
//! layer its table, identity and change-detection rules, and gives the
//! integrity validator a uniform [`AuditRow`] projection.

pub mod jobs;
pub mod masters;
pub mod tenants;
pub mod transactions;

use ledgersync_common::{Table, TenantScope};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use jobs::{JobStatus, SyncJob, SyncJobDetail};
pub use masters::{CostCentre, Godown, Group, Ledger, StockGroup, StockItem, Unit, VoucherType};
pub use tenants::{Company, Division};
pub use transactions::{InventoryEntry, LedgerEntry, Voucher, VoucherAmounts};

/// A row of one table in the normalized schema.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const TABLE: Table;

    fn id(&self) -> Uuid;

    /// Whether the row belongs to the given tenant scope.
    fn in_scope(&self, scope: &TenantScope) -> bool;

    /// Human-readable identifier used in outcomes and job details.
    fn display_key(&self) -> String;

    /// True when a significant field differs from the stored row.
    ///
    /// Rows without significant fields are immutable once written.
    fn differs_from(&self, _existing: &Self) -> bool {
        false
    }

    /// The row to write when updating `existing` with `self`.
    fn merged_for_update(&self, _existing: &Self) -> Self {
        self.clone()
    }

    fn audit(&self) -> AuditRow;
}

/// Foreign reference held by a row, as seen by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub table: Table,
    pub id: Uuid,
}

impl Reference {
    pub fn new(field: &'static str, table: Table, id: Uuid) -> Self {
        Self { field, table, id }
    }
}

/// Validator projection of a row.
#[derive(Debug, Clone, Default)]
pub struct AuditRow {
    pub id: Uuid,
    /// Normalized natural key, when the table has one.
    pub natural_key: Option<String>,
    /// Parent within the same table (group hierarchies).
    pub parent_id: Option<Uuid>,
    pub references: Vec<Reference>,
    /// Required columns that hold no value.
    pub missing_required: Vec<&'static str>,
}

impl AuditRow {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn natural_key(mut self, key: impl Into<String>) -> Self {
        self.natural_key = Some(key.into());
        self
    }

    pub fn parent(mut self, parent_id: Option<Uuid>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn reference(mut self, field: &'static str, table: Table, id: Uuid) -> Self {
        self.references.push(Reference::new(field, table, id));
        self
    }

    pub fn optional_reference(self, field: &'static str, table: Table, id: Option<Uuid>) -> Self {
        match id {
            Some(id) => self.reference(field, table, id),
            None => self,
        }
    }

    /// Adds the two tenant-root references carried by every scoped row.
    pub fn tenant(self, company_id: Uuid, division_id: Uuid) -> Self {
        self.reference("company_id", Table::Companies, company_id)
            .reference("division_id", Table::Divisions, division_id)
    }

    pub fn require(mut self, column: &'static str, present: bool) -> Self {
        if !present {
            self.missing_required.push(column);
        }
        self
    }
}

/// Foreign key from an entry row to its voucher.
///
/// `Unlinked` is a designed intermediate state: the child arrived before (or
/// without) its parent and carries the voucher number the linker resolves
/// later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum VoucherLink {
    Linked(Uuid),
    Unlinked(String),
}

impl VoucherLink {
    pub fn voucher_id(&self) -> Option<Uuid> {
        match self {
            VoucherLink::Linked(id) => Some(*id),
            VoucherLink::Unlinked(_) => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, VoucherLink::Linked(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_row_builder() {
        let id = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let row = AuditRow::new(id)
            .natural_key("cash")
            .tenant(Uuid::nil(), Uuid::nil())
            .optional_reference("parent_id", Table::Groups, Some(parent))
            .optional_reference("unit_id", Table::Units, None)
            .require("closing_balance", false)
            .require("opening_balance", true);

        assert_eq!(row.id, id);
        assert_eq!(row.natural_key.as_deref(), Some("cash"));
        assert_eq!(row.references.len(), 3);
        assert_eq!(row.missing_required, vec!["closing_balance"]);
    }

    #[test]
    fn test_voucher_link() {
        let id = Uuid::new_v4();
        assert_eq!(VoucherLink::Linked(id).voucher_id(), Some(id));
        assert!(VoucherLink::Unlinked("INV-001".into()).voucher_id().is_none());
        assert!(!VoucherLink::Unlinked("INV-001".into()).is_linked());
    }
}
