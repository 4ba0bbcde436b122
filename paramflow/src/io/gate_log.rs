//! JSON-lines persistence for the gate ledger.
//!
//! The file is only ever appended to; earlier lines are never rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::gate::{GateEntry, GateLedger};

/// Load every entry from a ledger file. A missing file is an empty ledger.
pub fn load_gate_log(path: &Path) -> Result<GateLedger> {
    if !path.exists() {
        return Ok(GateLedger::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read gate log {}", path.display()))?;
    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: GateEntry = serde_json::from_str(line)
            .with_context(|| format!("parse gate log {} line {}", path.display(), idx + 1))?;
        entries.push(entry);
    }
    Ok(GateLedger::from_entries(entries))
}

/// Append `entries` to the ledger file, one JSON object per line.
pub fn append_gate_entries(path: &Path, entries: &[GateEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open gate log {}", path.display()))?;
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry).context("serialize gate entry")?);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())
        .with_context(|| format!("append gate log {}", path.display()))?;
    debug!(path = %path.display(), entries = entries.len(), "gate entries appended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::certificate::Condition;
    use crate::core::gate::GateCheckSpec;
    use crate::core::registry::ParameterRegistry;

    #[test]
    fn appends_across_runs_and_reloads() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gates.jsonl");
        let spec = GateCheckSpec::new("G1", "x positive", Condition::above("x.value", 0.0));

        let mut registry = ParameterRegistry::new();
        registry.set_param("x.value", 1.0, "unit").expect("x");
        let mut ledger = load_gate_log(&path).expect("empty");
        assert!(ledger.is_empty());
        ledger.record("run-1", "unit", &spec, &registry);
        append_gate_entries(&path, ledger.entries()).expect("append first");

        registry.set_param("x.value", -1.0, "unit").expect("x");
        let mut ledger = load_gate_log(&path).expect("reload");
        let offset = ledger.len();
        ledger.record("run-2", "unit", &spec, &registry);
        append_gate_entries(&path, ledger.since(offset)).expect("append second");

        let reloaded = load_gate_log(&path).expect("reload");
        let outcomes: Vec<(String, bool)> = reloaded
            .entries()
            .iter()
            .map(|entry| (entry.run_id.clone(), entry.passed))
            .collect();
        assert_eq!(
            outcomes,
            vec![("run-1".to_string(), true), ("run-2".to_string(), false)]
        );
    }
}
