//! Voucher extraction
//!
//! Turns `<VOUCHER>` blocks into [`ParsedVoucher`] values and those into
//! rows. Parsing is pure; nothing here touches the store.

use chrono::NaiveDate;
use ledgersync_common::identity::{
    inventory_entry_id, ledger_entry_id, master_id, normalize_name, optional_master_id, voucher_id,
};
use ledgersync_common::{MasterKind, TenantScope};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use super::extractor::{Fragment, TagSource};
use super::masters::{LedgerHints, StockItemHints};
use super::normalize::{
    decimal_or_zero, parse_compact_date, parse_decimal, parse_flag, parse_integer, unit_suffix,
};
use crate::models::{InventoryEntry, LedgerEntry, Voucher};

const LEDGER_ENTRY_TAGS: [&str; 2] = ["ALLLEDGERENTRIES.LIST", "LEDGERENTRIES.LIST"];
const INVENTORY_ENTRY_TAGS: [&str; 2] = ["ALLINVENTORYENTRIES.LIST", "INVENTORYENTRIES.LIST"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLedgerEntry {
    pub ledger_name: String,
    pub amount: Decimal,
    pub is_deemed_positive: bool,
    pub is_party_ledger: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInventoryEntry {
    pub stock_item_name: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub rate: Decimal,
    pub amount: Decimal,
    pub is_deemed_positive: bool,
    pub godown_name: Option<String>,
    pub hsn_code: Option<String>,
}

impl ParsedInventoryEntry {
    pub fn stock_item_hints(&self) -> StockItemHints {
        StockItemHints {
            base_unit: self.unit.clone(),
            hsn_code: self.hsn_code.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVoucher {
    pub guid: String,
    pub voucher_number: String,
    pub voucher_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub narration: Option<String>,
    pub party_ledger_name: Option<String>,
    pub alter_id: Option<i64>,
    pub is_cancelled: bool,
    pub amount: Option<Decimal>,
    /// Details about the party carried on the voucher
    pub party: LedgerHints,
    pub ledger_entries: Vec<ParsedLedgerEntry>,
    pub inventory_entries: Vec<ParsedInventoryEntry>,
}

/// A voucher block that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedVoucher {
    /// Position of the block in the payload
    pub index: usize,
    pub voucher_number: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoucherBlock {
    Parsed(Box<ParsedVoucher>),
    Skipped(SkippedVoucher),
}

/// Rows derived from one voucher.
#[derive(Debug, Clone)]
pub struct VoucherRows {
    pub voucher: Voucher,
    pub ledger_entries: Vec<LedgerEntry>,
    pub inventory_entries: Vec<InventoryEntry>,
}

/// Lazily parse every `<VOUCHER>` block of a payload.
pub fn extract_vouchers<'a>(payload: &'a Fragment<'a>) -> impl Iterator<Item = VoucherBlock> + 'a {
    payload
        .blocks("VOUCHER")
        .enumerate()
        .map(|(index, block)| parse_voucher(&block, index))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub fn parse_voucher(block: &Fragment<'_>, index: usize) -> VoucherBlock {
    let top = block.top_level();
    let voucher_number = top.field("VOUCHERNUMBER").unwrap_or_default();

    let Some(guid) = non_empty(top.field("GUID")) else {
        tracing::warn!(index, voucher_number = %voucher_number, "Skipping voucher without GUID");
        return VoucherBlock::Skipped(SkippedVoucher {
            index,
            voucher_number: Some(voucher_number).filter(|n| !n.is_empty()),
            reason: "voucher has no GUID".to_string(),
        });
    };

    let date = match top.field("DATE") {
        Some(raw) => match parse_compact_date(&raw) {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::warn!(guid = %guid, error = %e, "Voucher date discarded");
                None
            }
        },
        None => None,
    };

    let voucher = ParsedVoucher {
        voucher_type: non_empty(top.field("VOUCHERTYPENAME"))
            .or_else(|| non_empty(block.own_attribute("VCHTYPE"))),
        date,
        reference: non_empty(top.field("REFERENCE")),
        narration: non_empty(top.field("NARRATION")),
        party_ledger_name: non_empty(top.field("PARTYLEDGERNAME")),
        alter_id: top.field("ALTERID").as_deref().and_then(parse_integer),
        is_cancelled: top.field("ISCANCELLED").as_deref().is_some_and(parse_flag),
        amount: top.field("AMOUNT").as_deref().and_then(parse_decimal),
        party: party_hints(block, &top),
        ledger_entries: ledger_entries(block),
        inventory_entries: inventory_entries(block),
        guid,
        voucher_number,
    };

    VoucherBlock::Parsed(Box::new(voucher))
}

fn party_hints(block: &Fragment<'_>, top: &Fragment<'_>) -> LedgerHints {
    let address = block
        .blocks("ADDRESS.LIST")
        .next()
        .map(|list| {
            list.blocks("ADDRESS")
                .map(|line| line.decoded())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|a| !a.is_empty());

    LedgerHints {
        address,
        state: non_empty(top.first_field(&["STATENAME", "PLACEOFSUPPLY"])),
        pincode: non_empty(top.field("PARTYPINCODE")),
        gstin: non_empty(top.first_field(&["PARTYGSTIN", "BASICBUYERGSTIN"])),
        ..Default::default()
    }
}

fn ledger_entries(block: &Fragment<'_>) -> Vec<ParsedLedgerEntry> {
    LEDGER_ENTRY_TAGS
        .into_iter()
        .flat_map(|tag| block.blocks(tag))
        .filter_map(|entry| {
            let top = entry.top_level();
            let Some(ledger_name) = non_empty(top.field("LEDGERNAME")) else {
                tracing::debug!("Skipping ledger entry without ledger name");
                return None;
            };
            Some(ParsedLedgerEntry {
                ledger_name,
                amount: decimal_or_zero(top.field("AMOUNT").as_deref()),
                is_deemed_positive: top.field("ISDEEMEDPOSITIVE").as_deref().is_some_and(parse_flag),
                is_party_ledger: top.field("ISPARTYLEDGER").as_deref().is_some_and(parse_flag),
            })
        })
        .collect()
}

fn inventory_entries(block: &Fragment<'_>) -> Vec<ParsedInventoryEntry> {
    INVENTORY_ENTRY_TAGS
        .into_iter()
        .flat_map(|tag| block.blocks(tag))
        .filter_map(|entry| {
            let top = entry.top_level();
            let Some(stock_item_name) = non_empty(top.field("STOCKITEMNAME")) else {
                tracing::debug!("Skipping inventory entry without stock item");
                return None;
            };
            let quantity_text = top.first_field(&["ACTUALQTY", "BILLEDQTY"]);
            let rate_text = top.field("RATE");

            let godown_name = entry
                .blocks("BATCHALLOCATIONS.LIST")
                .find_map(|batch| non_empty(batch.field("GODOWNNAME")))
                .or_else(|| non_empty(top.field("GODOWNNAME")));

            Some(ParsedInventoryEntry {
                stock_item_name,
                quantity: decimal_or_zero(quantity_text.as_deref()),
                unit: quantity_text
                    .as_deref()
                    .and_then(unit_suffix)
                    .or_else(|| rate_text.as_deref().and_then(unit_suffix)),
                rate: decimal_or_zero(rate_text.as_deref()),
                amount: decimal_or_zero(top.field("AMOUNT").as_deref()),
                is_deemed_positive: top.field("ISDEEMEDPOSITIVE").as_deref().is_some_and(parse_flag),
                godown_name,
                hsn_code: non_empty(top.first_field(&["GSTHSNNAME", "HSNCODE"])),
            })
        })
        .collect()
}

/// Occurrence counter keyed by normalized name.
#[derive(Default)]
struct Ordinals(HashMap<String, usize>);

impl Ordinals {
    fn next(&mut self, name: &str) -> usize {
        let slot = self.0.entry(normalize_name(name)).or_insert(0);
        let ordinal = *slot;
        *slot += 1;
        ordinal
    }
}

impl ParsedVoucher {
    /// Build the voucher row and its children.
    ///
    /// With `link_children` the entries reference the voucher directly;
    /// otherwise they stay unlinked for the linker to resolve by number.
    pub fn into_rows(self, scope: &TenantScope, link_children: bool) -> VoucherRows {
        let id = voucher_id(scope, &self.guid);
        let link = link_children.then_some(id);

        let mut ordinals = Ordinals::default();
        let ledger_entries = self
            .ledger_entries
            .iter()
            .map(|e| LedgerEntry {
                id: ledger_entry_id(scope, &self.guid, &e.ledger_name, ordinals.next(&e.ledger_name)),
                company_id: scope.company_id,
                division_id: scope.division_id,
                voucher_id: link,
                voucher_guid: self.guid.clone(),
                voucher_number: self.voucher_number.clone(),
                voucher_type: self.voucher_type.clone(),
                ledger_name: e.ledger_name.clone(),
                ledger_id: master_id(scope, MasterKind::Ledger, &e.ledger_name),
                amount: e.amount,
                is_deemed_positive: e.is_deemed_positive,
                is_party_ledger: e.is_party_ledger,
            })
            .collect();

        let mut ordinals = Ordinals::default();
        let inventory_entries = self
            .inventory_entries
            .iter()
            .map(|e| InventoryEntry {
                id: inventory_entry_id(
                    scope,
                    &self.guid,
                    &e.stock_item_name,
                    ordinals.next(&e.stock_item_name),
                ),
                company_id: scope.company_id,
                division_id: scope.division_id,
                voucher_id: link,
                voucher_guid: self.guid.clone(),
                voucher_number: self.voucher_number.clone(),
                voucher_type: self.voucher_type.clone(),
                stock_item_name: e.stock_item_name.clone(),
                stock_item_id: master_id(scope, MasterKind::StockItem, &e.stock_item_name),
                godown_name: e.godown_name.clone(),
                godown_id: optional_master_id(scope, MasterKind::Godown, e.godown_name.as_deref()),
                quantity: e.quantity,
                unit: e.unit.clone(),
                rate: e.rate,
                amount: e.amount,
                is_deemed_positive: e.is_deemed_positive,
            })
            .collect();

        let voucher = Voucher {
            id,
            company_id: scope.company_id,
            division_id: scope.division_id,
            voucher_type_id: optional_master_id(scope, MasterKind::VoucherType, self.voucher_type.as_deref()),
            party_ledger_id: optional_master_id(scope, MasterKind::Ledger, self.party_ledger_name.as_deref()),
            guid: self.guid,
            voucher_number: self.voucher_number,
            voucher_type: self.voucher_type,
            date: self.date,
            reference: self.reference,
            narration: self.narration,
            party_ledger_name: self.party_ledger_name,
            total_amount: self.amount.map(|a| a.abs()),
            net_amount: None,
            basic_amount: None,
            final_amount: None,
            alter_id: self.alter_id,
            is_cancelled: self.is_cancelled,
        };

        VoucherRows {
            voucher,
            ledger_entries,
            inventory_entries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    const SALES: &str = r#"
<ENVELOPE><BODY><DATA><TALLYMESSAGE>
<VOUCHER REMOTEID="r-1" VCHTYPE="Sales" ACTION="Create">
  <ADDRESS.LIST TYPE="String">
    <ADDRESS>12 Market Road</ADDRESS>
    <ADDRESS>Bengaluru</ADDRESS>
  </ADDRESS.LIST>
  <DATE>20240401</DATE>
  <GUID>guid-inv-001</GUID>
  <STATENAME>Karnataka</STATENAME>
  <PARTYGSTIN>29ABCDE1234F1Z5</PARTYGSTIN>
  <NARRATION>Being goods sold &amp; delivered</NARRATION>
  <PARTYLEDGERNAME>Acme Traders</PARTYLEDGERNAME>
  <VOUCHERNUMBER>INV-001</VOUCHERNUMBER>
  <ALTERID> 42</ALTERID>
  <ISCANCELLED>No</ISCANCELLED>
  <ALLINVENTORYENTRIES.LIST>
    <STOCKITEMNAME>Widget</STOCKITEMNAME>
    <GSTHSNNAME>8471</GSTHSNNAME>
    <ISDEEMEDPOSITIVE>No</ISDEEMEDPOSITIVE>
    <RATE>50.00/Nos</RATE>
    <AMOUNT>500.00</AMOUNT>
    <ACTUALQTY> 10 Nos</ACTUALQTY>
    <BILLEDQTY> 10 Nos</BILLEDQTY>
    <BATCHALLOCATIONS.LIST>
      <GODOWNNAME>Main Location</GODOWNNAME>
      <AMOUNT>500.00</AMOUNT>
    </BATCHALLOCATIONS.LIST>
  </ALLINVENTORYENTRIES.LIST>
  <LEDGERENTRIES.LIST>
    <LEDGERNAME>Acme Traders</LEDGERNAME>
    <ISDEEMEDPOSITIVE>Yes</ISDEEMEDPOSITIVE>
    <ISPARTYLEDGER>Yes</ISPARTYLEDGER>
    <AMOUNT>-500.00</AMOUNT>
    <BILLALLOCATIONS.LIST>
      <AMOUNT>-999.00</AMOUNT>
    </BILLALLOCATIONS.LIST>
  </LEDGERENTRIES.LIST>
  <LEDGERENTRIES.LIST>
    <LEDGERNAME>Sales</LEDGERNAME>
    <ISDEEMEDPOSITIVE>No</ISDEEMEDPOSITIVE>
    <AMOUNT>500.00</AMOUNT>
  </LEDGERENTRIES.LIST>
</VOUCHER>
</TALLYMESSAGE></DATA></BODY></ENVELOPE>
"#;

    fn parsed(payload: &str) -> Vec<VoucherBlock> {
        let fragment = Fragment::new(payload);
        extract_vouchers(&fragment).collect()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_voucher_scalars() {
        let blocks = parsed(SALES);
        assert_eq!(blocks.len(), 1);
        let VoucherBlock::Parsed(v) = &blocks[0] else {
            panic!("expected parsed voucher");
        };

        assert_eq!(v.guid, "guid-inv-001");
        assert_eq!(v.voucher_number, "INV-001");
        assert_eq!(v.voucher_type.as_deref(), Some("Sales"));
        assert_eq!(v.date, NaiveDate::from_ymd_opt(2024, 4, 1));
        assert_eq!(v.narration.as_deref(), Some("Being goods sold & delivered"));
        assert_eq!(v.alter_id, Some(42));
        assert!(!v.is_cancelled);
        assert!(v.amount.is_none(), "entry amounts must not leak into the header");
        assert_eq!(v.party.gstin.as_deref(), Some("29ABCDE1234F1Z5"));
        assert_eq!(v.party.address.as_deref(), Some("12 Market Road, Bengaluru"));
    }

    #[test]
    fn test_entries() {
        let blocks = parsed(SALES);
        let VoucherBlock::Parsed(v) = &blocks[0] else {
            panic!("expected parsed voucher");
        };

        assert_eq!(v.ledger_entries.len(), 2);
        assert_eq!(v.ledger_entries[0].amount, d("-500.00"));
        assert!(v.ledger_entries[0].is_party_ledger);
        assert!(v.ledger_entries[0].is_deemed_positive);
        assert_eq!(v.ledger_entries[1].ledger_name, "Sales");

        let item = &v.inventory_entries[0];
        assert_eq!(item.quantity, d("10"));
        assert_eq!(item.unit.as_deref(), Some("Nos"));
        assert_eq!(item.rate, d("50"));
        assert_eq!(item.amount, d("500"));
        assert_eq!(item.godown_name.as_deref(), Some("Main Location"));
        assert_eq!(item.hsn_code.as_deref(), Some("8471"));
    }

    #[test]
    fn test_missing_guid_is_skipped() {
        let blocks = parsed("<VOUCHER><VOUCHERNUMBER>7</VOUCHERNUMBER></VOUCHER><VOUCHER><GUID>g</GUID></VOUCHER>");
        assert_eq!(blocks.len(), 2);
        assert!(matches!(
            &blocks[0],
            VoucherBlock::Skipped(SkippedVoucher { index: 0, voucher_number: Some(n), .. }) if n == "7"
        ));
        assert!(matches!(&blocks[1], VoucherBlock::Parsed(_)));
    }

    #[test]
    fn test_invalid_date_is_null() {
        let blocks = parsed("<VOUCHER><GUID>g</GUID><DATE>2024-04-01</DATE></VOUCHER>");
        let VoucherBlock::Parsed(v) = &blocks[0] else {
            panic!("expected parsed voucher");
        };
        assert!(v.date.is_none());
    }

    #[test]
    fn test_rows_and_ordinals() {
        let payload = r#"<VOUCHER><GUID>g-1</GUID><VOUCHERNUMBER>R-9</VOUCHERNUMBER>
            <LEDGERENTRIES.LIST><LEDGERNAME>Cash</LEDGERNAME><AMOUNT>-50</AMOUNT></LEDGERENTRIES.LIST>
            <LEDGERENTRIES.LIST><LEDGERNAME>Cash</LEDGERNAME><AMOUNT>-50</AMOUNT></LEDGERENTRIES.LIST>
            <LEDGERENTRIES.LIST><LEDGERNAME>Bank</LEDGERNAME><AMOUNT>100</AMOUNT></LEDGERENTRIES.LIST>
            </VOUCHER>"#;
        let VoucherBlock::Parsed(v) = parsed(payload).remove(0) else {
            panic!("expected parsed voucher");
        };
        let v = *v;
        let scope = TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2));

        let rows = v.clone().into_rows(&scope, false);
        assert_eq!(rows.ledger_entries.len(), 3);
        assert_ne!(rows.ledger_entries[0].id, rows.ledger_entries[1].id);
        assert!(rows.ledger_entries.iter().all(|e| e.voucher_id.is_none()));
        assert!(rows.voucher.voucher_type_id.is_none());

        let linked = v.into_rows(&scope, true);
        assert!(linked.ledger_entries.iter().all(|e| e.voucher_id == Some(linked.voucher.id)));
        assert_eq!(linked.ledger_entries[2].id, rows.ledger_entries[2].id);
    }
}
