//! Deterministic row identifiers
//!
//! Every identifier in the store is a pure function of the tenant scope and a
//! name (or source GUID). Re-deriving an id from the same input always yields
//! the same value, so concurrent workers never need a shared name → id table.
//!
//! Names are normalized before hashing: surrounding whitespace is trimmed,
//! inner runs of whitespace collapse to one space and the result is
//! lowercased. `"Cash"`, `" cash "` and `"CASH"` therefore resolve to the
//! same master row, matching how the source ERP treats names.

use uuid::Uuid;

use crate::types::{MasterKind, TenantScope};

/// Namespace for all v5 identifiers issued by ledgersync.
const LEDGERSYNC_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_6467_6572_5379_6e63_0000_0000_0001);

/// Normalize a name for identity and natural-key comparison.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn derive(scope: &TenantScope, kind: &str, key: &str) -> Uuid {
    let material = format!("{}|{}|{}|{}", scope.company_id, scope.division_id, kind, key);
    Uuid::new_v5(&LEDGERSYNC_NAMESPACE, material.as_bytes())
}

/// Identifier of a master row.
pub fn master_id(scope: &TenantScope, kind: MasterKind, name: &str) -> Uuid {
    derive(scope, kind.as_str(), &normalize_name(name))
}

/// Identifier of an optional master reference; blank names have no id.
pub fn optional_master_id(scope: &TenantScope, kind: MasterKind, name: Option<&str>) -> Option<Uuid> {
    name.filter(|n| !n.trim().is_empty())
        .map(|n| master_id(scope, kind, n))
}

/// Identifier of a voucher, keyed by the source GUID.
///
/// GUIDs are opaque and case-sensitive, so only surrounding whitespace is
/// removed.
pub fn voucher_id(scope: &TenantScope, guid: &str) -> Uuid {
    derive(scope, "voucher", guid.trim())
}

/// Identifier of a ledger entry: voucher GUID + ledger name + occurrence.
///
/// The ordinal counts earlier entries with the same ledger name in the same
/// voucher, keeping split allocations distinct.
pub fn ledger_entry_id(scope: &TenantScope, voucher_guid: &str, ledger_name: &str, ordinal: usize) -> Uuid {
    let key = format!("{}|{}|{}", voucher_guid.trim(), normalize_name(ledger_name), ordinal);
    derive(scope, "ledger_entry", &key)
}

/// Identifier of an inventory entry: voucher GUID + stock item name + occurrence.
pub fn inventory_entry_id(scope: &TenantScope, voucher_guid: &str, stock_item: &str, ordinal: usize) -> Uuid {
    let key = format!("{}|{}|{}", voucher_guid.trim(), normalize_name(stock_item), ordinal);
    derive(scope, "inventory_entry", &key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn scope() -> TenantScope {
        TenantScope::new(
            Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
            Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap(),
        )
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Sundry   Debtors "), "sundry debtors");
        assert_eq!(normalize_name("CASH"), "cash");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_master_id_is_stable() {
        let s = scope();
        assert_eq!(
            master_id(&s, MasterKind::Ledger, "Cash"),
            master_id(&s, MasterKind::Ledger, "Cash")
        );
        assert_eq!(
            master_id(&s, MasterKind::Ledger, "Cash"),
            master_id(&s, MasterKind::Ledger, "  CASH ")
        );
    }

    #[test]
    fn test_master_id_separates_kinds_and_tenants() {
        let s = scope();
        let other = TenantScope::new(s.company_id, Uuid::nil());

        assert_ne!(
            master_id(&s, MasterKind::Ledger, "Sales"),
            master_id(&s, MasterKind::VoucherType, "Sales")
        );
        assert_ne!(
            master_id(&s, MasterKind::Ledger, "Sales"),
            master_id(&other, MasterKind::Ledger, "Sales")
        );
    }

    #[test]
    fn test_optional_master_id_skips_blank() {
        let s = scope();
        assert!(optional_master_id(&s, MasterKind::Godown, None).is_none());
        assert!(optional_master_id(&s, MasterKind::Godown, Some("   ")).is_none());
        assert_eq!(
            optional_master_id(&s, MasterKind::Godown, Some("Main Location")),
            Some(master_id(&s, MasterKind::Godown, "main location"))
        );
    }

    #[test]
    fn test_entry_ids_distinguish_ordinals() {
        let s = scope();
        let first = ledger_entry_id(&s, "guid-1", "Cash", 0);
        let second = ledger_entry_id(&s, "guid-1", "Cash", 1);
        assert_ne!(first, second);
        assert_eq!(first, ledger_entry_id(&s, "guid-1", "cash", 0));
        assert_ne!(first, inventory_entry_id(&s, "guid-1", "Cash", 0));
    }

    #[test]
    fn test_voucher_id_keeps_guid_case() {
        let s = scope();
        assert_eq!(voucher_id(&s, " abc-1 "), voucher_id(&s, "abc-1"));
        assert_ne!(voucher_id(&s, "ABC-1"), voucher_id(&s, "abc-1"));
    }
}
