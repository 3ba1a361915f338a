//! Master export blocks
//!
//! Master exports (`<LEDGER NAME="Cash">…</LEDGER>`) carry the full record.
//! They go through the same [`MasterResolver`] as names referenced by
//! vouchers, so an existing master is never overwritten.

use ledgersync_common::MasterKind;

use super::extractor::{Fragment, TagSource};
use super::masters::{
    CostCentreHints, GodownHints, GroupHints, LedgerHints, MasterResolution, MasterResolver, ResolveError,
    StockItemHints, UnitHints, VoucherTypeHints,
};
use super::normalize::{parse_decimal, parse_flag, parse_integer};
use crate::db::Store;

/// A master record read from its export block.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterBlock {
    Group { name: String, hints: GroupHints },
    Ledger { name: String, hints: LedgerHints },
    Unit { name: String, hints: UnitHints },
    StockGroup { name: String, parent: Option<String> },
    StockItem { name: String, hints: StockItemHints },
    Godown { name: String, hints: GodownHints },
    CostCentre { name: String, hints: CostCentreHints },
    VoucherType { name: String, hints: VoucherTypeHints },
}

/// Export tag of each master kind, in dependency order.
const MASTER_TAGS: [(MasterKind, &str); 8] = [
    (MasterKind::Group, "GROUP"),
    (MasterKind::Ledger, "LEDGER"),
    (MasterKind::Unit, "UNIT"),
    (MasterKind::StockGroup, "STOCKGROUP"),
    (MasterKind::StockItem, "STOCKITEM"),
    (MasterKind::Godown, "GODOWN"),
    (MasterKind::CostCentre, "COSTCENTRE"),
    (MasterKind::VoucherType, "VOUCHERTYPE"),
];

impl MasterBlock {
    pub fn kind(&self) -> MasterKind {
        match self {
            Self::Group { .. } => MasterKind::Group,
            Self::Ledger { .. } => MasterKind::Ledger,
            Self::Unit { .. } => MasterKind::Unit,
            Self::StockGroup { .. } => MasterKind::StockGroup,
            Self::StockItem { .. } => MasterKind::StockItem,
            Self::Godown { .. } => MasterKind::Godown,
            Self::CostCentre { .. } => MasterKind::CostCentre,
            Self::VoucherType { .. } => MasterKind::VoucherType,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Group { name, .. }
            | Self::Ledger { name, .. }
            | Self::Unit { name, .. }
            | Self::StockGroup { name, .. }
            | Self::StockItem { name, .. }
            | Self::Godown { name, .. }
            | Self::CostCentre { name, .. }
            | Self::VoucherType { name, .. } => name,
        }
    }

    /// Create the master unless it already exists.
    pub async fn resolve<S: Store>(&self, resolver: &MasterResolver<'_, S>) -> Result<MasterResolution, ResolveError> {
        match self {
            Self::Group { name, hints } => resolver.ensure_group(name, hints).await,
            Self::Ledger { name, hints } => resolver.ensure_ledger(name, hints).await,
            Self::Unit { name, hints } => resolver.ensure_unit(name, hints).await,
            Self::StockGroup { name, parent } => resolver.ensure_stock_group(name, parent.clone()).await,
            Self::StockItem { name, hints } => resolver.ensure_stock_item(name, hints).await,
            Self::Godown { name, hints } => resolver.ensure_godown_with(name, hints).await,
            Self::CostCentre { name, hints } => resolver.ensure_cost_centre(name, hints).await,
            Self::VoucherType { name, hints } => resolver.ensure_voucher_type_with(name, hints).await,
        }
    }
}

/// Every master block of a payload, parents before children.
pub fn extract_masters(payload: &Fragment<'_>) -> Vec<MasterBlock> {
    MASTER_TAGS
        .into_iter()
        .flat_map(move |(kind, tag)| payload.blocks(tag).map(move |block| parse_block(kind, &block)))
        .collect()
}

fn text(fragment: &Fragment<'_>, tag: &str) -> Option<String> {
    fragment.field(tag).filter(|v| !v.is_empty())
}

fn flag(fragment: &Fragment<'_>, tag: &str) -> Option<bool> {
    text(fragment, tag).as_deref().map(parse_flag)
}

fn decimal(fragment: &Fragment<'_>, tag: &str) -> Option<rust_decimal::Decimal> {
    text(fragment, tag).as_deref().and_then(parse_decimal)
}

fn block_name(block: &Fragment<'_>, top: &Fragment<'_>) -> String {
    block
        .own_attribute("NAME")
        .filter(|n| !n.trim().is_empty())
        .or_else(|| text(top, "NAME"))
        .or_else(|| block.blocks("NAME.LIST").find_map(|list| text(&list, "NAME")))
        .unwrap_or_default()
}

fn address(block: &Fragment<'_>) -> Option<String> {
    block
        .blocks("ADDRESS.LIST")
        .next()
        .map(|list| {
            list.blocks("ADDRESS")
                .map(|line| line.decoded())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|a| !a.is_empty())
}

fn parse_block(kind: MasterKind, block: &Fragment<'_>) -> MasterBlock {
    let top = block.top_level();
    let name = block_name(block, &top);
    let parent = text(&top, "PARENT");

    match kind {
        MasterKind::Group => MasterBlock::Group {
            name,
            hints: GroupHints {
                parent,
                is_deemed_positive: flag(&top, "ISDEEMEDPOSITIVE"),
            },
        },
        MasterKind::Ledger => MasterBlock::Ledger {
            name,
            hints: LedgerHints {
                parent,
                address: address(block),
                state: top.first_field(&["LEDSTATENAME", "STATENAME"]),
                pincode: text(&top, "PINCODE"),
                email: text(&top, "EMAIL"),
                phone: top.first_field(&["LEDGERPHONE", "LEDGERMOBILE"]),
                gstin: top.first_field(&["PARTYGSTIN", "GSTIN"]),
                pan: text(&top, "INCOMETAXNUMBER"),
                opening_balance: decimal(&top, "OPENINGBALANCE"),
                closing_balance: decimal(&top, "CLOSINGBALANCE"),
                is_deemed_positive: flag(&top, "ISDEEMEDPOSITIVE"),
            },
        },
        MasterKind::Unit => MasterBlock::Unit {
            name,
            hints: UnitHints {
                formal_name: text(&top, "ORIGINALNAME"),
                decimal_places: text(&top, "DECIMALPLACES")
                    .as_deref()
                    .and_then(parse_integer)
                    .and_then(|v| i32::try_from(v).ok()),
            },
        },
        MasterKind::StockGroup => MasterBlock::StockGroup { name, parent },
        MasterKind::StockItem => {
            let hsn_code = text(&top, "HSNCODE").or_else(|| {
                block
                    .blocks("GSTDETAILS.LIST")
                    .find_map(|gst| text(&gst, "HSNCODE"))
            });
            let gst_rate = block
                .blocks("RATEDETAILS.LIST")
                .find(|rate| text(rate, "GSTRATEDUTYHEAD").as_deref() == Some("IGST"))
                .and_then(|rate| decimal(&rate, "GSTRATE"));
            MasterBlock::StockItem {
                name,
                hints: StockItemHints {
                    parent,
                    base_unit: text(&top, "BASEUNITS"),
                    hsn_code,
                    gst_rate,
                    taxability: block
                        .blocks("GSTDETAILS.LIST")
                        .find_map(|gst| text(&gst, "TAXABILITY")),
                    opening_quantity: decimal(&top, "OPENINGBALANCE"),
                    opening_rate: decimal(&top, "OPENINGRATE"),
                    opening_value: decimal(&top, "OPENINGVALUE"),
                },
            }
        }
        MasterKind::Godown => MasterBlock::Godown {
            name,
            hints: GodownHints {
                parent,
                address: address(block),
            },
        },
        MasterKind::CostCentre => MasterBlock::CostCentre {
            name,
            hints: CostCentreHints {
                parent,
                category: text(&top, "CATEGORY"),
            },
        },
        MasterKind::VoucherType => MasterBlock::VoucherType {
            name,
            hints: VoucherTypeHints {
                parent,
                is_deemed_positive: flag(&top, "ISDEEMEDPOSITIVE"),
                affects_stock: flag(&top, "AFFECTSSTOCK"),
            },
        },
    }
}
