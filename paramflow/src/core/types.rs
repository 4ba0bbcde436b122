//! Per-unit execution records and the run summary derived from them.
//!
//! Lists are kept in deterministic order (execution order for records, sorted
//! paths for outputs) so serialized reports stay stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::certificate::{CertificateRecord, SelfValidation};
use crate::core::gate::GateEntry;
use crate::core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// Not reached (the run aborted first).
    Pending,
    Completed,
    /// `run` or the write-back failed.
    Failed,
    /// Inputs became unavailable after an upstream failure.
    Skipped,
}

/// What happened to one unit during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub unit_id: String,
    pub version: String,
    pub state: UnitState,
    pub outputs_written: Vec<String>,
    /// Private result keys. Reported, never persisted.
    pub diagnostics: BTreeMap<String, Value>,
    pub self_validation: Option<SelfValidation>,
    pub certificates: Vec<CertificateRecord>,
    pub gate_entries: Vec<GateEntry>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn pending(unit_id: &str, version: &str) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            version: version.to_string(),
            state: UnitState::Pending,
            outputs_written: Vec::new(),
            diagnostics: BTreeMap::new(),
            self_validation: None,
            certificates: Vec::new(),
            gate_entries: Vec::new(),
            error: None,
        }
    }

    pub fn ran(&self) -> bool {
        matches!(self.state, UnitState::Completed | UnitState::Failed)
    }
}

/// Counts over a run's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub units_total: usize,
    pub units_completed: usize,
    pub units_failed: usize,
    pub units_skipped: usize,
    pub units_pending: usize,
    pub values_written: usize,
    pub certificates_passed: usize,
    pub certificates_failed: usize,
    pub self_validations_failed: usize,
    pub gates_passed: usize,
    pub gates_failed: usize,
}

impl RunSummary {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let mut summary = RunSummary {
            units_total: records.len(),
            ..RunSummary::default()
        };
        for record in records {
            match record.state {
                UnitState::Pending => summary.units_pending += 1,
                UnitState::Completed => summary.units_completed += 1,
                UnitState::Failed => summary.units_failed += 1,
                UnitState::Skipped => summary.units_skipped += 1,
            }
            summary.values_written += record.outputs_written.len();
            for certificate in &record.certificates {
                if certificate.passed() {
                    summary.certificates_passed += 1;
                } else {
                    summary.certificates_failed += 1;
                }
            }
            if record
                .self_validation
                .as_ref()
                .is_some_and(|validation| !validation.passed)
            {
                summary.self_validations_failed += 1;
            }
            for gate in &record.gate_entries {
                if gate.passed {
                    summary.gates_passed += 1;
                } else {
                    summary.gates_failed += 1;
                }
            }
        }
        summary
    }

    /// True when every unit completed and every finding passed.
    pub fn is_clean(&self) -> bool {
        self.units_completed == self.units_total
            && self.certificates_failed == 0
            && self.self_validations_failed == 0
            && self.gates_failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::certificate::{CertificateStatus, ValidationCheck};

    fn certificate(status: CertificateStatus) -> CertificateRecord {
        CertificateRecord {
            id: "C".to_string(),
            unit_id: "u".to_string(),
            assertion: "a".to_string(),
            condition: "x <= 1".to_string(),
            computed_values: BTreeMap::new(),
            tolerance: None,
            status,
            missing_paths: Vec::new(),
            message: None,
            external_reference: None,
        }
    }

    #[test]
    fn summary_counts_states_and_findings() {
        let mut done = ExecutionRecord::pending("a", "1");
        done.state = UnitState::Completed;
        done.outputs_written = vec!["a.x".to_string(), "a.y".to_string()];
        done.certificates = vec![
            certificate(CertificateStatus::Pass),
            certificate(CertificateStatus::Fail),
        ];
        done.self_validation = Some(SelfValidation::from_checks(vec![ValidationCheck::new(
            "check", false, "off",
        )]));

        let mut failed = ExecutionRecord::pending("b", "1");
        failed.state = UnitState::Failed;
        let mut skipped = ExecutionRecord::pending("c", "1");
        skipped.state = UnitState::Skipped;
        let pending = ExecutionRecord::pending("d", "1");

        let summary = RunSummary::from_records(&[done, failed, skipped, pending]);
        assert_eq!(summary.units_total, 4);
        assert_eq!(summary.units_completed, 1);
        assert_eq!(summary.units_failed, 1);
        assert_eq!(summary.units_skipped, 1);
        assert_eq!(summary.units_pending, 1);
        assert_eq!(summary.values_written, 2);
        assert_eq!(summary.certificates_passed, 1);
        assert_eq!(summary.certificates_failed, 1);
        assert_eq!(summary.self_validations_failed, 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn empty_run_is_clean() {
        assert!(RunSummary::from_records(&[]).is_clean());
    }
}
