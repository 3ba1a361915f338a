//! Master data rows
//!
//! Masters are identified by `(tenant, kind, name)` and are immutable once
//! written; none of them define significant fields.

use ledgersync_common::identity::{master_id, normalize_name};
use ledgersync_common::{MasterKind, Table, TenantScope};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{AuditRow, Record};

/// Account group (chart-of-accounts node)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_deemed_positive: bool,
}

/// Ledger account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ledger {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub is_deemed_positive: bool,
}

/// Unit of measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Unit {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub formal_name: Option<String>,
    pub decimal_places: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StockGroup {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StockItem {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub base_unit: Option<String>,
    pub unit_id: Option<Uuid>,
    pub opening_quantity: Option<Decimal>,
    pub opening_rate: Option<Decimal>,
    pub opening_value: Option<Decimal>,
    pub closing_quantity: Option<Decimal>,
    pub closing_rate: Option<Decimal>,
    pub closing_value: Option<Decimal>,
    pub hsn_code: Option<String>,
    pub gst_rate: Option<Decimal>,
    pub taxability: Option<String>,
}

/// Storage location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Godown {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CostCentre {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VoucherType {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub parent_name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_deemed_positive: bool,
    pub affects_stock: bool,
}

impl Group {
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::Group, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: None,
            parent_id: None,
            is_deemed_positive: false,
        }
    }
}

impl Ledger {
    /// Parent group assigned to ledgers first seen inside a transaction.
    pub const DEFAULT_PARENT: &'static str = "Suspense A/c";

    /// A ledger with zero balances under the default parent group.
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::Ledger, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: Some(Self::DEFAULT_PARENT.to_string()),
            parent_id: Some(master_id(scope, MasterKind::Group, Self::DEFAULT_PARENT)),
            address: None,
            state: None,
            pincode: None,
            email: None,
            phone: None,
            gstin: None,
            pan: None,
            opening_balance: Some(Decimal::ZERO),
            closing_balance: Some(Decimal::ZERO),
            is_deemed_positive: false,
        }
    }
}

impl Unit {
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::Unit, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            formal_name: None,
            decimal_places: 0,
        }
    }
}

impl StockGroup {
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::StockGroup, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: None,
            parent_id: None,
        }
    }
}

impl StockItem {
    /// A stock item with zero opening and closing balances.
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::StockItem, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: None,
            parent_id: None,
            base_unit: None,
            unit_id: None,
            opening_quantity: Some(Decimal::ZERO),
            opening_rate: Some(Decimal::ZERO),
            opening_value: Some(Decimal::ZERO),
            closing_quantity: Some(Decimal::ZERO),
            closing_rate: Some(Decimal::ZERO),
            closing_value: Some(Decimal::ZERO),
            hsn_code: None,
            gst_rate: None,
            taxability: None,
        }
    }
}

impl Godown {
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::Godown, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: None,
            parent_id: None,
            address: None,
        }
    }
}

impl CostCentre {
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::CostCentre, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: None,
            parent_id: None,
            category: None,
        }
    }
}

impl VoucherType {
    pub fn new(scope: &TenantScope, name: &str) -> Self {
        Self {
            id: master_id(scope, MasterKind::VoucherType, name),
            company_id: scope.company_id,
            division_id: scope.division_id,
            name: name.trim().to_string(),
            parent_name: None,
            parent_id: None,
            is_deemed_positive: true,
            affects_stock: false,
        }
    }
}

fn scoped(company_id: Uuid, division_id: Uuid, scope: &TenantScope) -> bool {
    company_id == scope.company_id && division_id == scope.division_id
}

impl Record for Group {
    const TABLE: Table = Table::Groups;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .parent(self.parent_id)
            .optional_reference("parent_id", Table::Groups, self.parent_id)
    }
}

impl Record for Ledger {
    const TABLE: Table = Table::Ledgers;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .optional_reference("parent_id", Table::Groups, self.parent_id)
            .require("opening_balance", self.opening_balance.is_some())
            .require("closing_balance", self.closing_balance.is_some())
    }
}

impl Record for Unit {
    const TABLE: Table = Table::Units;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
    }
}

impl Record for StockGroup {
    const TABLE: Table = Table::StockGroups;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .parent(self.parent_id)
            .optional_reference("parent_id", Table::StockGroups, self.parent_id)
    }
}

impl Record for StockItem {
    const TABLE: Table = Table::StockItems;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .optional_reference("parent_id", Table::StockGroups, self.parent_id)
            .optional_reference("unit_id", Table::Units, self.unit_id)
            .require("opening_quantity", self.opening_quantity.is_some())
            .require("closing_quantity", self.closing_quantity.is_some())
    }
}

impl Record for Godown {
    const TABLE: Table = Table::Godowns;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .parent(self.parent_id)
            .optional_reference("parent_id", Table::Godowns, self.parent_id)
    }
}

impl Record for CostCentre {
    const TABLE: Table = Table::CostCentres;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .parent(self.parent_id)
            .optional_reference("parent_id", Table::CostCentres, self.parent_id)
    }
}

impl Record for VoucherType {
    const TABLE: Table = Table::VoucherTypes;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        scoped(self.company_id, self.division_id, scope)
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .natural_key(normalize_name(&self.name))
            .tenant(self.company_id, self.division_id)
            .parent(self.parent_id)
            .optional_reference("parent_id", Table::VoucherTypes, self.parent_id)
    }
}
