//! Run report and flat audit export.

use serde::{Deserialize, Serialize};

use crate::core::certificate::CertificateStatus;
use crate::core::registry::ParameterRegistry;
use crate::core::types::{ExecutionRecord, RunSummary, UnitState};
use crate::core::value::Status;

/// Statuses a unit can write. Their fingerprint identifies a run's results.
pub const COMPUTED_STATUSES: &[Status] = &[
    Status::Derived,
    Status::Geometric,
    Status::Predicted,
    Status::Foundational,
    Status::Speculative,
];

/// Everything a completed run produced, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub order: Vec<String>,
    pub summary: RunSummary,
    pub records: Vec<ExecutionRecord>,
    /// SHA-256 over every computed (non-`ESTABLISHED`) value after the run.
    pub fingerprint: String,
}

impl RunReport {
    pub fn new(run_id: &str, records: Vec<ExecutionRecord>, registry: &ParameterRegistry) -> Self {
        Self {
            run_id: run_id.to_string(),
            order: records.iter().map(|record| record.unit_id.clone()).collect(),
            summary: RunSummary::from_records(&records),
            records,
            fingerprint: registry.fingerprint(COMPUTED_STATUSES),
        }
    }

    pub fn record(&self, unit_id: &str) -> Option<&ExecutionRecord> {
        self.records.iter().find(|record| record.unit_id == unit_id)
    }

    /// Units that did not complete, with their error text.
    pub fn failures(&self) -> impl Iterator<Item = (&str, UnitState, &str)> {
        self.records.iter().filter_map(|record| {
            let error = record.error.as_deref()?;
            Some((record.unit_id.as_str(), record.state, error))
        })
    }

    /// True when the run completed but some certificate, self-validation, or
    /// gate check failed.
    pub fn has_failed_findings(&self) -> bool {
        self.summary.certificates_failed > 0
            || self.summary.self_validations_failed > 0
            || self.summary.gates_failed > 0
    }

    /// Flatten certificates and gate entries for external auditors.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        let mut out = Vec::new();
        for record in &self.records {
            for certificate in &record.certificates {
                out.push(AuditRecord {
                    kind: AuditKind::Certificate,
                    id: certificate.id.clone(),
                    unit_id: certificate.unit_id.clone(),
                    assertion: certificate.assertion.clone(),
                    condition: certificate.condition.clone(),
                    tolerance: certificate.tolerance,
                    status: certificate.status,
                    external_reference: certificate.external_reference.clone(),
                });
            }
            for gate in &record.gate_entries {
                out.push(AuditRecord {
                    kind: AuditKind::Gate,
                    id: gate.gate_id.clone(),
                    unit_id: gate.unit_id.clone(),
                    assertion: gate.claim.clone(),
                    condition: gate.condition.clone(),
                    tolerance: None,
                    status: CertificateStatus::from_passed(gate.passed),
                    external_reference: None,
                });
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Certificate,
    Gate,
}

/// One auditable finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub id: String,
    pub unit_id: String,
    pub assertion: String,
    pub condition: String,
    pub tolerance: Option<f64>,
    pub status: CertificateStatus,
    pub external_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::certificate::{CertificateSpec, Condition};
    use crate::core::gate::{GateCheckSpec, GateLedger};

    fn report() -> RunReport {
        let mut registry = ParameterRegistry::new();
        registry.establish("topology.b3", 24.0, "bootstrap").expect("b3");
        registry
            .set_param("thermal.alpha_T", 2.69, "thermal@1")
            .expect("alpha");

        let mut record = ExecutionRecord::pending("thermal", "1");
        record.state = UnitState::Completed;
        record.outputs_written.push("thermal.alpha_T".to_string());
        record.certificates.push(
            CertificateSpec::new(
                "CERT_ALPHA",
                "alpha near 2.7",
                Condition::approx("thermal.alpha_T", 2.7, 0.1),
            )
            .verified_by("independent derivation")
            .evaluate("thermal", &registry),
        );
        let mut ledger = GateLedger::new();
        let gate =
            GateCheckSpec::new("G1", "alpha below 3", Condition::below("thermal.alpha_T", 3.0));
        record
            .gate_entries
            .push(ledger.record("run", "thermal", &gate, &registry).clone());

        let mut failed = ExecutionRecord::pending("broken", "1");
        failed.state = UnitState::Failed;
        failed.error = Some("computation failed: boom".to_string());

        RunReport::new("run", vec![record, failed], &registry)
    }

    #[test]
    fn report_summarizes_records() {
        let report = report();
        assert_eq!(report.order, vec!["thermal", "broken"]);
        assert_eq!(report.summary.units_completed, 1);
        assert_eq!(report.summary.units_failed, 1);
        assert_eq!(report.summary.certificates_passed, 1);
        assert!(!report.has_failed_findings());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
    }

    #[test]
    fn audit_records_cover_certificates_and_gates() {
        let records = report().audit_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, AuditKind::Certificate);
        assert_eq!(records[0].tolerance, Some(0.1));
        assert_eq!(
            records[0].external_reference.as_deref(),
            Some("independent derivation")
        );
        assert_eq!(records[1].kind, AuditKind::Gate);
        assert_eq!(records[1].status, CertificateStatus::Pass);
    }

    #[test]
    fn fingerprint_ignores_established_values() {
        let report = report();
        let mut registry = ParameterRegistry::new();
        registry.establish("topology.b3", 99.0, "other").expect("b3");
        registry
            .set_param("thermal.alpha_T", 2.69, "thermal@1")
            .expect("alpha");
        assert_eq!(report.fingerprint, registry.fingerprint(COMPUTED_STATUSES));
    }
}
