//! Run report persistence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::audit::{AuditRecord, RunReport};

/// Atomically write the run report as pretty JSON (temp file + rename).
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    debug!(path = %path.display(), run_id = %report.run_id, "writing run report");
    let mut buf = serde_json::to_string_pretty(report).context("serialize run report")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

pub fn load_report(path: &Path) -> Result<RunReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read report {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse report {}", path.display()))
}

/// Write the flat audit records as a JSON array.
pub fn write_audit_records(path: &Path, records: &[AuditRecord]) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(records).context("serialize audit records")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
