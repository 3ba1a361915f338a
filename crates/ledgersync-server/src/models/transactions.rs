//! Transactional rows: vouchers and their entries

use chrono::NaiveDate;
use ledgersync_common::identity::normalize_name;
use ledgersync_common::{Table, TenantScope};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{AuditRow, Record, VoucherLink};

/// Voucher header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Voucher {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub guid: String,
    pub voucher_number: String,
    pub voucher_type: Option<String>,
    pub voucher_type_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub narration: Option<String>,
    pub party_ledger_name: Option<String>,
    pub party_ledger_id: Option<Uuid>,
    pub total_amount: Option<Decimal>,
    pub net_amount: Option<Decimal>,
    pub basic_amount: Option<Decimal>,
    pub final_amount: Option<Decimal>,
    pub alter_id: Option<i64>,
    pub is_cancelled: bool,
}

/// Derived aggregate amounts of a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherAmounts {
    pub total: Decimal,
    pub net: Decimal,
    pub basic: Decimal,
    pub final_amount: Decimal,
}

/// Accounting line of a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub voucher_id: Option<Uuid>,
    pub voucher_guid: String,
    pub voucher_number: String,
    pub voucher_type: Option<String>,
    pub ledger_name: String,
    pub ledger_id: Uuid,
    pub amount: Decimal,
    pub is_deemed_positive: bool,
    pub is_party_ledger: bool,
}

/// Stock line of a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InventoryEntry {
    pub id: Uuid,
    pub company_id: Uuid,
    pub division_id: Uuid,
    pub voucher_id: Option<Uuid>,
    pub voucher_guid: String,
    pub voucher_number: String,
    pub voucher_type: Option<String>,
    pub stock_item_name: String,
    pub stock_item_id: Uuid,
    pub godown_name: Option<String>,
    pub godown_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub rate: Decimal,
    pub amount: Decimal,
    pub is_deemed_positive: bool,
}

impl Voucher {
    pub fn amounts(&self) -> Option<VoucherAmounts> {
        Some(VoucherAmounts {
            total: self.total_amount?,
            net: self.net_amount?,
            basic: self.basic_amount?,
            final_amount: self.final_amount?,
        })
    }

    /// True when the reconciler should derive the aggregate amounts.
    pub fn needs_amounts(&self) -> bool {
        let unset = |v: Option<Decimal>| v.map_or(true, |d| d.is_zero());
        unset(self.total_amount) || unset(self.final_amount)
    }
}

impl LedgerEntry {
    pub fn link(&self) -> VoucherLink {
        match self.voucher_id {
            Some(id) => VoucherLink::Linked(id),
            None => VoucherLink::Unlinked(self.voucher_number.clone()),
        }
    }

    pub fn set_link(&mut self, link: VoucherLink) {
        self.voucher_id = link.voucher_id();
    }
}

impl InventoryEntry {
    pub fn link(&self) -> VoucherLink {
        match self.voucher_id {
            Some(id) => VoucherLink::Linked(id),
            None => VoucherLink::Unlinked(self.voucher_number.clone()),
        }
    }

    pub fn set_link(&mut self, link: VoucherLink) {
        self.voucher_id = link.voucher_id();
    }
}

impl Record for Voucher {
    const TABLE: Table = Table::Vouchers;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        self.company_id == scope.company_id && self.division_id == scope.division_id
    }

    fn display_key(&self) -> String {
        if self.voucher_number.is_empty() {
            self.guid.clone()
        } else {
            self.voucher_number.clone()
        }
    }

    fn differs_from(&self, existing: &Self) -> bool {
        self.voucher_number != existing.voucher_number
            || self.voucher_type != existing.voucher_type
            || self.date != existing.date
            || self.narration != existing.narration
            || self.party_ledger_name != existing.party_ledger_name
            || self.reference != existing.reference
            || self.is_cancelled != existing.is_cancelled
            || self.alter_id != existing.alter_id
    }

    /// Aggregates are owned by the reconciler and survive header updates.
    fn merged_for_update(&self, existing: &Self) -> Self {
        Self {
            total_amount: existing.total_amount,
            net_amount: existing.net_amount,
            basic_amount: existing.basic_amount,
            final_amount: existing.final_amount,
            ..self.clone()
        }
    }

    fn audit(&self) -> AuditRow {
        let mut row = AuditRow::new(self.id)
            .tenant(self.company_id, self.division_id)
            .optional_reference("voucher_type_id", Table::VoucherTypes, self.voucher_type_id)
            .optional_reference("party_ledger_id", Table::Ledgers, self.party_ledger_id)
            .require("date", self.date.is_some())
            .require("voucher_number", !self.voucher_number.trim().is_empty());
        if !self.voucher_number.trim().is_empty() {
            let key = format!(
                "{}|{}",
                normalize_name(&self.voucher_number),
                normalize_name(self.voucher_type.as_deref().unwrap_or_default())
            );
            row = row.natural_key(key);
        }
        row
    }
}

impl Record for LedgerEntry {
    const TABLE: Table = Table::LedgerEntries;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        self.company_id == scope.company_id && self.division_id == scope.division_id
    }

    fn display_key(&self) -> String {
        format!("{}/{}", self.voucher_number, self.ledger_name)
    }

    fn differs_from(&self, existing: &Self) -> bool {
        self.amount != existing.amount || self.is_deemed_positive != existing.is_deemed_positive
    }

    /// An update never clears an established voucher link.
    fn merged_for_update(&self, existing: &Self) -> Self {
        Self {
            voucher_id: self.voucher_id.or(existing.voucher_id),
            ..self.clone()
        }
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .tenant(self.company_id, self.division_id)
            .optional_reference("voucher_id", Table::Vouchers, self.voucher_id)
            .reference("ledger_id", Table::Ledgers, self.ledger_id)
            .require("ledger_name", !self.ledger_name.trim().is_empty())
    }
}

impl Record for InventoryEntry {
    const TABLE: Table = Table::InventoryEntries;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        self.company_id == scope.company_id && self.division_id == scope.division_id
    }

    fn display_key(&self) -> String {
        format!("{}/{}", self.voucher_number, self.stock_item_name)
    }

    fn differs_from(&self, existing: &Self) -> bool {
        self.quantity != existing.quantity
            || self.rate != existing.rate
            || self.amount != existing.amount
            || self.godown_name != existing.godown_name
    }

    fn merged_for_update(&self, existing: &Self) -> Self {
        Self {
            voucher_id: self.voucher_id.or(existing.voucher_id),
            ..self.clone()
        }
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
            .tenant(self.company_id, self.division_id)
            .optional_reference("voucher_id", Table::Vouchers, self.voucher_id)
            .reference("stock_item_id", Table::StockItems, self.stock_item_id)
            .optional_reference("godown_id", Table::Godowns, self.godown_id)
            .require("stock_item_name", !self.stock_item_name.trim().is_empty())
    }
}
