//! Append-only gate check ledger.
//!
//! Gate checks are coarse binary claims. Each evaluation appends a new
//! timestamped entry; existing entries are never edited, even when a later
//! run computes a different result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::certificate::Condition;
use crate::core::registry::ParameterRegistry;

/// A binary claim declared by a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct GateCheckSpec {
    pub gate_id: String,
    pub claim: String,
    pub condition: Condition,
}

impl GateCheckSpec {
    pub fn new(gate_id: &str, claim: &str, condition: Condition) -> Self {
        Self {
            gate_id: gate_id.to_string(),
            claim: claim.to_string(),
            condition,
        }
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEntry {
    pub seq: u64,
    pub gate_id: String,
    pub unit_id: String,
    pub claim: String,
    pub condition: String,
    pub passed: bool,
    pub recorded_at: DateTime<Utc>,
    pub run_id: String,
}

/// Append-only ledger of gate outcomes.
#[derive(Debug, Clone, Default)]
pub struct GateLedger {
    entries: Vec<GateEntry>,
}

impl GateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a ledger from previously persisted entries.
    pub fn from_entries(entries: Vec<GateEntry>) -> Self {
        Self { entries }
    }

    /// Evaluate `spec` against `registry` and append the outcome.
    pub fn record(
        &mut self,
        run_id: &str,
        unit_id: &str,
        spec: &GateCheckSpec,
        registry: &ParameterRegistry,
    ) -> &GateEntry {
        let passed = spec.condition.evaluate(registry).passed;
        self.append(run_id, unit_id, spec, passed)
    }

    /// Append a failed outcome without evaluating, for claims whose paths
    /// were never produced in this run.
    pub fn record_unavailable(
        &mut self,
        run_id: &str,
        unit_id: &str,
        spec: &GateCheckSpec,
    ) -> &GateEntry {
        self.append(run_id, unit_id, spec, false)
    }

    fn append(
        &mut self,
        run_id: &str,
        unit_id: &str,
        spec: &GateCheckSpec,
        passed: bool,
    ) -> &GateEntry {
        let seq = self.entries.last().map_or(1, |entry| entry.seq + 1);
        self.entries.push(GateEntry {
            seq,
            gate_id: spec.gate_id.clone(),
            unit_id: unit_id.to_string(),
            claim: spec.claim.clone(),
            condition: spec.condition.to_string(),
            passed,
            recorded_at: Utc::now(),
            run_id: run_id.to_string(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[GateEntry] {
        &self.entries
    }

    /// Entries appended after the first `offset` entries.
    pub fn since(&self, offset: usize) -> &[GateEntry] {
        &self.entries[offset.min(self.entries.len())..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry for `gate_id`, if any.
    pub fn latest(&self, gate_id: &str) -> Option<&GateEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.gate_id == gate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A changed outcome appends a new entry and leaves the old one untouched.
    #[test]
    fn reevaluation_appends_instead_of_editing() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("thermal.alpha_T", 2.7, "unit").expect("write");
        let spec = GateCheckSpec::new(
            "GATE_THERMAL",
            "alpha_T below 3",
            Condition::below("thermal.alpha_T", 3.0),
        );

        let mut ledger = GateLedger::new();
        assert!(ledger.record("run-1", "thermal", &spec, &registry).passed);
        let first = ledger.entries()[0].clone();

        registry.set_param("thermal.alpha_T", 3.5, "unit").expect("rewrite");
        assert!(!ledger.record("run-2", "thermal", &spec, &registry).passed);

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[0], first);
        assert_eq!(ledger.entries()[1].seq, 2);
        let latest = ledger.latest("GATE_THERMAL").expect("latest");
        assert_eq!(latest.run_id, "run-2");
        assert_eq!(ledger.since(1).len(), 1);
    }

    #[test]
    fn resumed_ledger_continues_sequence() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("a.b", 1.0, "unit").expect("write");
        let spec = GateCheckSpec::new("G", "a.b positive", Condition::above("a.b", 0.0));

        let mut ledger = GateLedger::new();
        ledger.record("run-1", "u", &spec, &registry);
        let mut resumed = GateLedger::from_entries(ledger.entries().to_vec());
        assert_eq!(resumed.record("run-2", "u", &spec, &registry).seq, 2);
    }

    #[test]
    fn unavailable_claims_fail_without_reading_stale_values() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("a.b", 1.0, "earlier run").expect("write");
        let spec = GateCheckSpec::new("G", "a.b positive", Condition::above("a.b", 0.0));

        let mut ledger = GateLedger::new();
        let entry = ledger.record_unavailable("run-1", "u", &spec);
        assert!(!entry.passed);
        assert_eq!(entry.seq, 1);
    }
}
