//! Common types used across ledgersync

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerSyncError;

// ============================================================================
// Tenant Scope
// ============================================================================

/// Two-level tenant key partitioning every row in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub company_id: Uuid,
    pub division_id: Uuid,
}

impl TenantScope {
    pub fn new(company_id: Uuid, division_id: Uuid) -> Self {
        Self {
            company_id,
            division_id,
        }
    }
}

impl std::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.company_id, self.division_id)
    }
}

// ============================================================================
// Table Catalogue
// ============================================================================

/// Every table of the normalized schema.
///
/// Declaration order is the dependency order: a table only references tables
/// declared before it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Companies,
    Divisions,
    Groups,
    Ledgers,
    Units,
    StockGroups,
    StockItems,
    Godowns,
    CostCentres,
    VoucherTypes,
    Vouchers,
    LedgerEntries,
    InventoryEntries,
}

impl Table {
    /// All tables, parents before children.
    pub const DEPENDENCY_ORDER: [Table; 13] = [
        Table::Companies,
        Table::Divisions,
        Table::Groups,
        Table::Ledgers,
        Table::Units,
        Table::StockGroups,
        Table::StockItems,
        Table::Godowns,
        Table::CostCentres,
        Table::VoucherTypes,
        Table::Vouchers,
        Table::LedgerEntries,
        Table::InventoryEntries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Companies => "companies",
            Table::Divisions => "divisions",
            Table::Groups => "groups",
            Table::Ledgers => "ledgers",
            Table::Units => "units",
            Table::StockGroups => "stock_groups",
            Table::StockItems => "stock_items",
            Table::Godowns => "godowns",
            Table::CostCentres => "cost_centres",
            Table::VoucherTypes => "voucher_types",
            Table::Vouchers => "vouchers",
            Table::LedgerEntries => "ledger_entries",
            Table::InventoryEntries => "inventory_entries",
        }
    }

    /// Tables the full sync pulls from the source system.
    ///
    /// Tenant roots are provisioned outside the pipeline.
    pub fn syncable() -> impl Iterator<Item = Table> {
        Self::DEPENDENCY_ORDER
            .into_iter()
            .filter(|t| !t.is_tenant_root())
    }

    pub fn is_tenant_root(&self) -> bool {
        matches!(self, Table::Companies | Table::Divisions)
    }

    pub fn is_master(&self) -> bool {
        self.master_kind().is_some()
    }

    /// Child tables carry a voucher link repaired by the linker.
    pub fn is_voucher_child(&self) -> bool {
        matches!(self, Table::LedgerEntries | Table::InventoryEntries)
    }

    pub fn master_kind(&self) -> Option<MasterKind> {
        match self {
            Table::Groups => Some(MasterKind::Group),
            Table::Ledgers => Some(MasterKind::Ledger),
            Table::Units => Some(MasterKind::Unit),
            Table::StockGroups => Some(MasterKind::StockGroup),
            Table::StockItems => Some(MasterKind::StockItem),
            Table::Godowns => Some(MasterKind::Godown),
            Table::CostCentres => Some(MasterKind::CostCentre),
            Table::VoucherTypes => Some(MasterKind::VoucherType),
            _ => None,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = LedgerSyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::DEPENDENCY_ORDER
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| LedgerSyncError::UnknownTable(s.to_string()))
    }
}

// ============================================================================
// Master Kinds
// ============================================================================

/// Kinds of master data referenced by transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterKind {
    Group,
    Ledger,
    Unit,
    StockGroup,
    StockItem,
    Godown,
    CostCentre,
    VoucherType,
}

impl MasterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasterKind::Group => "group",
            MasterKind::Ledger => "ledger",
            MasterKind::Unit => "unit",
            MasterKind::StockGroup => "stock_group",
            MasterKind::StockItem => "stock_item",
            MasterKind::Godown => "godown",
            MasterKind::CostCentre => "cost_centre",
            MasterKind::VoucherType => "voucher_type",
        }
    }

    pub fn table(&self) -> Table {
        match self {
            MasterKind::Group => Table::Groups,
            MasterKind::Ledger => Table::Ledgers,
            MasterKind::Unit => Table::Units,
            MasterKind::StockGroup => Table::StockGroups,
            MasterKind::StockItem => Table::StockItems,
            MasterKind::Godown => Table::Godowns,
            MasterKind::CostCentre => Table::CostCentres,
            MasterKind::VoucherType => Table::VoucherTypes,
        }
    }
}

impl std::fmt::Display for MasterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sync Actions
// ============================================================================

/// Action selector accepted by the full-sync entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    #[default]
    FullSync,
    HealthCheck,
    Metadata,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::FullSync => "full_sync",
            SyncAction::HealthCheck => "health_check",
            SyncAction::Metadata => "metadata",
        }
    }
}

impl std::str::FromStr for SyncAction {
    type Err = LedgerSyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "full_sync" => Ok(SyncAction::FullSync),
            "health_check" => Ok(SyncAction::HealthCheck),
            "metadata" => Ok(SyncAction::Metadata),
            _ => Err(LedgerSyncError::UnknownAction(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
