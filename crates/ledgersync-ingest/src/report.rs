//! Report output

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Write `report` as pretty JSON to `path`, or to stdout when absent.
pub fn write_report<T: Serialize>(report: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report saved");
        }
        None => println!("{}", json),
    }
    Ok(())
}
