//! Per-record outcomes and their summaries

use ledgersync_common::{MasterKind, Table};
use serde::Serialize;
use std::collections::BTreeMap;

use super::linker::LinkReport;
use super::masters::{MasterOutcome, MasterResolution};
use super::reconciler::ReconcileReport;
use super::upsert::UpsertAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeAction {
    Inserted,
    Updated,
    Ignored,
    CreatedMaster,
    Error,
}

impl OutcomeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Ignored => "ignored",
            Self::CreatedMaster => "created_master",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for OutcomeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<UpsertAction> for OutcomeAction {
    fn from(action: UpsertAction) -> Self {
        match action {
            UpsertAction::Inserted => Self::Inserted,
            UpsertAction::Updated => Self::Updated,
            UpsertAction::Ignored => Self::Ignored,
        }
    }
}

impl From<MasterOutcome> for OutcomeAction {
    fn from(outcome: MasterOutcome) -> Self {
        match outcome {
            MasterOutcome::Created => Self::CreatedMaster,
            MasterOutcome::AlreadyExists => Self::Ignored,
        }
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub table: Table,
    pub action: OutcomeAction,
    /// Natural identifier: master name, voucher number or GUID
    pub identifier: String,
    /// Record kind, e.g. `ledger` or `voucher`
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RecordOutcome {
    pub fn new(table: Table, action: OutcomeAction, identifier: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            table,
            action,
            identifier: identifier.into(),
            kind: kind.into(),
            message: None,
        }
    }

    pub fn error(table: Table, identifier: impl Into<String>, kind: impl Into<String>, message: impl ToString) -> Self {
        Self::new(table, OutcomeAction::Error, identifier, kind).with_message(message.to_string())
    }

    pub fn master(resolution: &MasterResolution) -> Self {
        Self::new(
            resolution.kind.table(),
            resolution.outcome.into(),
            resolution.name.clone(),
            resolution.kind.as_str(),
        )
    }

    pub fn master_error(kind: MasterKind, name: &str, message: impl ToString) -> Self {
        Self::error(kind.table(), name, kind.as_str(), message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Counts by action and by table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub by_action: BTreeMap<OutcomeAction, usize>,
    pub by_table: BTreeMap<String, BTreeMap<OutcomeAction, usize>>,
}

impl IngestSummary {
    pub fn from_outcomes(outcomes: &[RecordOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.record(outcome.table, outcome.action);
        }
        summary
    }

    pub fn record(&mut self, table: Table, action: OutcomeAction) {
        *self.by_action.entry(action).or_default() += 1;
        *self
            .by_table
            .entry(table.as_str().to_string())
            .or_default()
            .entry(action)
            .or_default() += 1;
    }

    pub fn count(&self, action: OutcomeAction) -> usize {
        self.by_action.get(&action).copied().unwrap_or(0)
    }

    pub fn table_count(&self, table: Table, action: OutcomeAction) -> usize {
        self.by_table
            .get(table.as_str())
            .and_then(|actions| actions.get(&action))
            .copied()
            .unwrap_or(0)
    }
}

/// Result of ingesting one payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<RecordOutcome>,
    pub summary: IngestSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
}

impl IngestReport {
    pub fn new(outcomes: Vec<RecordOutcome>) -> Self {
        let summary = IngestSummary::from_outcomes(&outcomes);
        Self {
            outcomes,
            summary,
            link: None,
            reconcile: None,
        }
    }

    pub fn count(&self, action: OutcomeAction) -> usize {
        self.summary.count(action)
    }

    pub fn errors(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| o.action == OutcomeAction::Error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            RecordOutcome::new(Table::Ledgers, OutcomeAction::CreatedMaster, "Cash", "ledger"),
            RecordOutcome::new(Table::Ledgers, OutcomeAction::CreatedMaster, "Sales", "ledger"),
            RecordOutcome::new(Table::Vouchers, OutcomeAction::Inserted, "INV-001", "voucher"),
            RecordOutcome::error(Table::Vouchers, "#2", "voucher", "voucher has no GUID"),
        ];
        let report = IngestReport::new(outcomes);

        assert_eq!(report.count(OutcomeAction::CreatedMaster), 2);
        assert_eq!(report.count(OutcomeAction::Updated), 0);
        assert_eq!(report.summary.table_count(Table::Vouchers, OutcomeAction::Error), 1);
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn test_serialized_shape() {
        let report = IngestReport::new(vec![RecordOutcome::new(
            Table::InventoryEntries,
            OutcomeAction::Inserted,
            "INV-001",
            "inventory_entry",
        )]);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["outcomes"][0]["table"], "inventory_entries");
        assert_eq!(json["outcomes"][0]["action"], "inserted");
        assert!(json["outcomes"][0].get("message").is_none());
        assert_eq!(json["summary"]["by_action"]["inserted"], 1);
        assert_eq!(json["summary"]["by_table"]["inventory_entries"]["inserted"], 1);
        assert!(json.get("link").is_none());
    }

    #[test]
    fn test_master_outcome_mapping() {
        assert_eq!(OutcomeAction::from(MasterOutcome::Created), OutcomeAction::CreatedMaster);
        assert_eq!(OutcomeAction::from(MasterOutcome::AlreadyExists), OutcomeAction::Ignored);
    }
}
