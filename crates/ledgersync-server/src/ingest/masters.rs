//! Master resolution
//!
//! Transactions reference masters by name only. [`MasterResolver`] turns a
//! name into the master's deterministic id and makes sure the row exists,
//! creating it with defaults (plus whatever hints the payload carried) when
//! it does not. Existing masters are never modified.
//!
//! Creation is a single conditional insert, so two workers resolving the
//! same name concurrently both end up with the same id; exactly one of them
//! reports [`MasterOutcome::Created`].

use ledgersync_common::identity::{master_id, optional_master_id};
use ledgersync_common::{MasterKind, TenantScope};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{RecordStore, Store, StoreError};
use crate::models::{
    CostCentre, Godown, Group, Ledger, Record, StockGroup, StockItem, Unit, VoucherType,
};

/// Name of the implicit root of every master hierarchy.
pub const ROOT_PARENT: &str = "Primary";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Blank {0} name")]
    BlankName(MasterKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterResolution {
    pub id: Uuid,
    pub kind: MasterKind,
    pub name: String,
    pub outcome: MasterOutcome,
}

impl MasterResolution {
    pub fn created(&self) -> bool {
        self.outcome == MasterOutcome::Created
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupHints {
    pub parent: Option<String>,
    pub is_deemed_positive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerHints {
    pub parent: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub is_deemed_positive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitHints {
    pub formal_name: Option<String>,
    pub decimal_places: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockItemHints {
    pub parent: Option<String>,
    pub base_unit: Option<String>,
    pub hsn_code: Option<String>,
    pub gst_rate: Option<Decimal>,
    pub taxability: Option<String>,
    pub opening_quantity: Option<Decimal>,
    pub opening_rate: Option<Decimal>,
    pub opening_value: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GodownHints {
    pub parent: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostCentreHints {
    pub parent: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoucherTypeHints {
    pub parent: Option<String>,
    pub is_deemed_positive: Option<bool>,
    pub affects_stock: Option<bool>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Creates missing masters for one tenant scope.
pub struct MasterResolver<'a, S: Store> {
    store: &'a S,
    scope: TenantScope,
}

impl<'a, S: Store> MasterResolver<'a, S> {
    pub fn new(store: &'a S, scope: TenantScope) -> Self {
        Self { store, scope }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Parent name and id within the same hierarchy; the root has neither.
    fn parent(&self, kind: MasterKind, parent: &Option<String>) -> (Option<String>, Option<Uuid>) {
        match non_blank(parent) {
            Some(p) if !p.eq_ignore_ascii_case(ROOT_PARENT) => {
                let id = master_id(&self.scope, kind, &p);
                (Some(p), Some(id))
            }
            _ => (None, None),
        }
    }

    async fn create<R>(&self, kind: MasterKind, record: R) -> Result<MasterResolution, ResolveError>
    where
        R: Record,
        S: RecordStore<R>,
    {
        let inserted = RecordStore::<R>::insert(self.store, &record).await?;
        let outcome = if inserted {
            tracing::debug!(kind = %kind, name = %record.display_key(), scope = %self.scope, "Created master");
            MasterOutcome::Created
        } else {
            MasterOutcome::AlreadyExists
        };
        Ok(MasterResolution {
            id: record.id(),
            kind,
            name: record.display_key(),
            outcome,
        })
    }

    fn check_name(kind: MasterKind, name: &str) -> Result<(), ResolveError> {
        if name.trim().is_empty() {
            return Err(ResolveError::BlankName(kind));
        }
        Ok(())
    }

    pub async fn ensure_group(&self, name: &str, hints: &GroupHints) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::Group, name)?;
        let mut group = Group::new(&self.scope, name);
        (group.parent_name, group.parent_id) = self.parent(MasterKind::Group, &hints.parent);
        group.is_deemed_positive = hints.is_deemed_positive.unwrap_or(group.is_deemed_positive);
        self.create(MasterKind::Group, group).await
    }

    /// Ledgers default to the suspense group with zero balances.
    ///
    /// The parent group itself is not created here; a missing group shows
    /// up as an orphaned reference in validation until its master block
    /// arrives.
    pub async fn ensure_ledger(&self, name: &str, hints: &LedgerHints) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::Ledger, name)?;
        let mut ledger = Ledger::new(&self.scope, name);
        if hints.parent.is_some() {
            (ledger.parent_name, ledger.parent_id) = self.parent(MasterKind::Group, &hints.parent);
        }
        ledger.address = non_blank(&hints.address);
        ledger.state = non_blank(&hints.state);
        ledger.pincode = non_blank(&hints.pincode);
        ledger.email = non_blank(&hints.email);
        ledger.phone = non_blank(&hints.phone);
        ledger.gstin = non_blank(&hints.gstin);
        ledger.pan = non_blank(&hints.pan);
        if let Some(opening) = hints.opening_balance {
            ledger.opening_balance = Some(opening);
        }
        if let Some(closing) = hints.closing_balance {
            ledger.closing_balance = Some(closing);
        }
        ledger.is_deemed_positive = hints.is_deemed_positive.unwrap_or(ledger.is_deemed_positive);
        self.create(MasterKind::Ledger, ledger).await
    }

    pub async fn ensure_unit(&self, name: &str, hints: &UnitHints) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::Unit, name)?;
        let mut unit = Unit::new(&self.scope, name);
        unit.formal_name = non_blank(&hints.formal_name);
        unit.decimal_places = hints.decimal_places.unwrap_or(unit.decimal_places);
        self.create(MasterKind::Unit, unit).await
    }

    pub async fn ensure_stock_group(&self, name: &str, parent: Option<String>) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::StockGroup, name)?;
        let mut group = StockGroup::new(&self.scope, name);
        (group.parent_name, group.parent_id) = self.parent(MasterKind::StockGroup, &parent);
        self.create(MasterKind::StockGroup, group).await
    }

    /// Stock items default to zero balances with no group or unit.
    pub async fn ensure_stock_item(
        &self,
        name: &str,
        hints: &StockItemHints,
    ) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::StockItem, name)?;
        let mut item = StockItem::new(&self.scope, name);
        (item.parent_name, item.parent_id) = self.parent(MasterKind::StockGroup, &hints.parent);
        item.base_unit = non_blank(&hints.base_unit);
        item.unit_id = optional_master_id(&self.scope, MasterKind::Unit, item.base_unit.as_deref());
        item.hsn_code = non_blank(&hints.hsn_code);
        item.gst_rate = hints.gst_rate;
        item.taxability = non_blank(&hints.taxability);
        if let Some(quantity) = hints.opening_quantity {
            item.opening_quantity = Some(quantity);
            item.closing_quantity = Some(quantity);
        }
        if let Some(rate) = hints.opening_rate {
            item.opening_rate = Some(rate);
            item.closing_rate = Some(rate);
        }
        if let Some(value) = hints.opening_value {
            item.opening_value = Some(value);
            item.closing_value = Some(value);
        }
        self.create(MasterKind::StockItem, item).await
    }

    pub async fn ensure_godown(&self, name: &str) -> Result<MasterResolution, ResolveError> {
        self.ensure_godown_with(name, &GodownHints::default()).await
    }

    pub async fn ensure_godown_with(&self, name: &str, hints: &GodownHints) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::Godown, name)?;
        let mut godown = Godown::new(&self.scope, name);
        (godown.parent_name, godown.parent_id) = self.parent(MasterKind::Godown, &hints.parent);
        godown.address = non_blank(&hints.address);
        self.create(MasterKind::Godown, godown).await
    }

    pub async fn ensure_cost_centre(
        &self,
        name: &str,
        hints: &CostCentreHints,
    ) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::CostCentre, name)?;
        let mut centre = CostCentre::new(&self.scope, name);
        (centre.parent_name, centre.parent_id) = self.parent(MasterKind::CostCentre, &hints.parent);
        centre.category = non_blank(&hints.category);
        self.create(MasterKind::CostCentre, centre).await
    }

    pub async fn ensure_voucher_type(&self, name: &str) -> Result<MasterResolution, ResolveError> {
        self.ensure_voucher_type_with(name, &VoucherTypeHints::default()).await
    }

    pub async fn ensure_voucher_type_with(
        &self,
        name: &str,
        hints: &VoucherTypeHints,
    ) -> Result<MasterResolution, ResolveError> {
        Self::check_name(MasterKind::VoucherType, name)?;
        let mut voucher_type = VoucherType::new(&self.scope, name);
        (voucher_type.parent_name, voucher_type.parent_id) =
            self.parent(MasterKind::VoucherType, &hints.parent);
        voucher_type.is_deemed_positive = hints
            .is_deemed_positive
            .unwrap_or(voucher_type.is_deemed_positive);
        voucher_type.affects_stock = hints.affects_stock.unwrap_or(voucher_type.affects_stock);
        self.create(MasterKind::VoucherType, voucher_type).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::{self, MemoryStore};
    use ledgersync_common::Table;

    fn scope() -> TenantScope {
        TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2))
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let store = MemoryStore::new();
        let resolver = MasterResolver::new(&store, scope());

        let first = resolver.ensure_voucher_type("Sales").await.unwrap();
        let second = resolver.ensure_voucher_type(" sales ").await.unwrap();

        assert_eq!(first.outcome, MasterOutcome::Created);
        assert_eq!(second.outcome, MasterOutcome::AlreadyExists);
        assert_eq!(first.id, second.id);
        assert_eq!(store.count(&scope(), Table::VoucherTypes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ledger_hints_and_defaults() {
        let store = MemoryStore::new();
        let resolver = MasterResolver::new(&store, scope());
        let hints = LedgerHints {
            gstin: Some("29ABCDE1234F1Z5".into()),
            state: Some("Karnataka".into()),
            address: Some("  ".into()),
            ..Default::default()
        };

        let resolution = resolver.ensure_ledger("Acme Traders", &hints).await.unwrap();
        let ledger: Ledger = db::get(&store, resolution.id).await.unwrap().unwrap();

        assert_eq!(ledger.parent_name.as_deref(), Some(Ledger::DEFAULT_PARENT));
        assert_eq!(ledger.gstin.as_deref(), Some("29ABCDE1234F1Z5"));
        assert!(ledger.address.is_none());
        assert_eq!(ledger.opening_balance, Some(Decimal::ZERO));
        assert_eq!(store.count(&scope(), Table::Groups).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_existing_master_not_overwritten() {
        let store = MemoryStore::new();
        let resolver = MasterResolver::new(&store, scope());
        resolver.ensure_ledger("Cash", &LedgerHints::default()).await.unwrap();

        let hints = LedgerHints {
            phone: Some("555-0100".into()),
            ..Default::default()
        };
        let again = resolver.ensure_ledger("Cash", &hints).await.unwrap();
        let ledger: Ledger = db::get(&store, again.id).await.unwrap().unwrap();

        assert!(!again.created());
        assert!(ledger.phone.is_none());
    }

    #[tokio::test]
    async fn test_primary_parent_is_root() {
        let store = MemoryStore::new();
        let resolver = MasterResolver::new(&store, scope());
        let hints = GroupHints {
            parent: Some("Primary".into()),
            is_deemed_positive: Some(true),
        };
        let resolution = resolver.ensure_group("Current Assets", &hints).await.unwrap();
        let group: Group = db::get(&store, resolution.id).await.unwrap().unwrap();

        assert!(group.parent_id.is_none());
        assert!(group.is_deemed_positive);
    }

    #[tokio::test]
    async fn test_stock_item_unit_reference() {
        let store = MemoryStore::new();
        let resolver = MasterResolver::new(&store, scope());
        let hints = StockItemHints {
            base_unit: Some("Nos".into()),
            hsn_code: Some("8471".into()),
            ..Default::default()
        };
        let resolution = resolver.ensure_stock_item("Widget", &hints).await.unwrap();
        let item: StockItem = db::get(&store, resolution.id).await.unwrap().unwrap();

        assert_eq!(item.unit_id, Some(master_id(&scope(), MasterKind::Unit, "nos")));
        assert_eq!(item.closing_quantity, Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_blank_name_and_store_failure() {
        let store = MemoryStore::new().fail_writes_to(Table::Godowns);
        let resolver = MasterResolver::new(&store, scope());

        assert!(matches!(
            resolver.ensure_godown("  ").await,
            Err(ResolveError::BlankName(MasterKind::Godown))
        ));
        assert!(matches!(
            resolver.ensure_godown("Main Location").await,
            Err(ResolveError::Store(_))
        ));
    }
}
