//! Per-unit execution wrapper.
//!
//! A unit runs in two phases so the orchestrator can parallelize the first:
//! [`RegisteredUnit::compute`] only reads the registry; [`RegisteredUnit::commit`]
//! writes outputs and evaluates self-validation, certificates, and gate checks.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, info, warn};

use crate::core::certificate::{CertificateRecord, CertificateSpec, Condition};
use crate::core::error::{EngineError, UnitError};
use crate::core::gate::{GateCheckSpec, GateEntry, GateLedger};
use crate::core::invariants::validate_unit;
use crate::core::registry::{ParamWrite, ParameterRegistry};
use crate::core::types::{ExecutionRecord, UnitState};
use crate::core::unit::{
    Capabilities, FormulaRef, InputView, OutputDefinition, Outputs, SectionRef, SimulationUnit,
    UnitDescriptor,
};
use crate::core::value::Value;

/// A unit plus the declarations captured once at registration.
pub struct RegisteredUnit {
    unit: Box<dyn SimulationUnit>,
    capabilities: Capabilities,
    definitions: BTreeMap<String, OutputDefinition>,
    certificates: Vec<CertificateSpec>,
    gates: Vec<GateCheckSpec>,
    formulas: Vec<FormulaRef>,
    section: Option<SectionRef>,
}

impl RegisteredUnit {
    /// Validate the unit's declarations and capture its capabilities.
    pub fn new(unit: Box<dyn SimulationUnit>) -> Result<Self, EngineError> {
        let capabilities = unit.capabilities();
        let errors = validate_unit(unit.as_ref(), capabilities);
        if !errors.is_empty() {
            return Err(EngineError::InvalidUnit {
                unit_id: unit.descriptor().id.clone(),
                errors,
            });
        }

        let definitions = if capabilities.output_definitions {
            unit.output_definitions()
                .into_iter()
                .map(|definition| (definition.path.clone(), definition))
                .collect()
        } else {
            BTreeMap::new()
        };
        let certificates = if capabilities.certificates {
            unit.certificates()
        } else {
            Vec::new()
        };
        let gates = if capabilities.gate_checks {
            unit.gate_checks()
        } else {
            Vec::new()
        };

        let formulas = if capabilities.formulas {
            unit.formulas()
        } else {
            Vec::new()
        };
        let section = if capabilities.section_content {
            unit.section_content()
        } else {
            None
        };

        Ok(Self {
            unit,
            capabilities,
            definitions,
            certificates,
            gates,
            formulas,
            section,
        })
    }

    pub fn id(&self) -> &str {
        &self.unit.descriptor().id
    }

    pub fn descriptor(&self) -> &UnitDescriptor {
        self.unit.descriptor()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn unit(&self) -> &dyn SimulationUnit {
        self.unit.as_ref()
    }

    pub fn certificates(&self) -> &[CertificateSpec] {
        &self.certificates
    }

    /// Formula references, passed through for rendering elsewhere.
    pub fn formulas(&self) -> &[FormulaRef] {
        &self.formulas
    }

    pub fn section(&self) -> Option<&SectionRef> {
        self.section.as_ref()
    }

    /// Check inputs and call `run`. Reads the registry only.
    pub fn compute(&self, registry: &ParameterRegistry) -> Result<Outputs, UnitError> {
        let descriptor = self.unit.descriptor();
        if let Some(missing) = descriptor
            .required_inputs
            .iter()
            .find(|path| !registry.has_param(path))
        {
            return Err(UnitError::MissingInput(missing.clone()));
        }

        let view = InputView::new(registry, &descriptor.required_inputs);
        match catch_unwind(AssertUnwindSafe(|| self.unit.run(&view))) {
            Ok(result) => result,
            Err(payload) => Err(UnitError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Write outputs and evaluate the unit's optional checks into `record`.
    ///
    /// Certificates and gate checks that read a path still pending in this
    /// run are returned instead; the caller evaluates them once the run has
    /// finished. The unit's own outputs count as produced.
    pub fn commit(
        &self,
        outputs: Outputs,
        registry: &mut ParameterRegistry,
        ledger: &mut GateLedger,
        context: &CommitContext<'_>,
        record: &mut ExecutionRecord,
    ) -> Result<Deferred, UnitError> {
        let (persisted, diagnostics) = outputs.partition();
        self.check_result(&persisted)?;

        let unit_id = self.id();
        for (path, value) in persisted {
            let write = self.write_for(&path, value);
            if context.verbose {
                info!(
                    unit = %unit_id,
                    path = %path,
                    value = %write.value,
                    status = %write.status,
                    "output"
                );
            } else {
                debug!(unit = %unit_id, path = %path, "output");
            }
            registry.write(write)?;
            record.outputs_written.push(path);
        }
        record.diagnostics = diagnostics;

        if self.capabilities.self_validation
            && let Some(validation) = self.unit.validate_self()
        {
            if !validation.passed {
                warn!(unit = %unit_id, "self-validation failed");
            }
            record.self_validation = Some(validation);
        }

        let own = &self.unit.descriptor().output_params;
        let pending = |condition: &Condition| {
            condition
                .paths()
                .iter()
                .any(|path| context.pending.contains(path) && !own.contains(path))
        };

        let mut deferred = Deferred::default();
        for spec in &self.certificates {
            if pending(&spec.condition) {
                debug!(unit = %unit_id, certificate = %spec.id, "certificate deferred");
                deferred.certificates.push(spec.clone());
            } else {
                record
                    .certificates
                    .push(evaluate_certificate(spec, unit_id, registry, context.unavailable));
            }
        }
        for spec in &self.gates {
            if pending(&spec.condition) {
                debug!(unit = %unit_id, gate = %spec.gate_id, "gate check deferred");
                deferred.gates.push(spec.clone());
            } else {
                let entry = record_gate(
                    spec,
                    unit_id,
                    registry,
                    ledger,
                    context.run_id,
                    context.unavailable,
                );
                record.gate_entries.push(entry);
            }
        }

        record.state = UnitState::Completed;
        Ok(deferred)
    }

    /// Run this unit alone: compute, then commit with every certificate and
    /// gate check evaluated immediately.
    pub fn execute(
        &self,
        registry: &mut ParameterRegistry,
        ledger: &mut GateLedger,
        run_id: &str,
        verbose: bool,
    ) -> Result<ExecutionRecord, UnitError> {
        let descriptor = self.descriptor();
        let mut record = ExecutionRecord::pending(&descriptor.id, &descriptor.version);
        let outputs = self.compute(registry)?;
        let none = BTreeSet::new();
        let context = CommitContext {
            run_id,
            verbose,
            pending: &none,
            unavailable: &none,
        };
        self.commit(outputs, registry, ledger, &context, &mut record)?;
        Ok(record)
    }

    /// Every persisted key must be declared, every declared output present,
    /// and every value storable, before anything is written.
    fn check_result(&self, persisted: &BTreeMap<String, Value>) -> Result<(), UnitError> {
        let declared = &self.unit.descriptor().output_params;
        if let Some(path) = persisted.keys().find(|path| !declared.contains(*path)) {
            return Err(UnitError::UndeclaredOutput(path.clone()));
        }
        if let Some(path) = declared.iter().find(|path| !persisted.contains_key(*path)) {
            return Err(UnitError::MissingOutput(path.clone()));
        }
        for (path, value) in persisted {
            value.check().map_err(|message| {
                UnitError::Computation(format!("output '{path}' is not storable: {message}"))
            })?;
        }
        Ok(())
    }

    fn write_for(&self, path: &str, value: Value) -> ParamWrite {
        let descriptor = self.unit.descriptor();
        let source = format!("{}@{}", descriptor.id, descriptor.version);
        let mut write = ParamWrite::new(path, value, &source).written_by(&descriptor.id);
        if let Some(definition) = self.definitions.get(path) {
            write = write
                .status(definition.status)
                .metadata(definition.metadata.clone());
            if let Some(uncertainty) = definition.uncertainty {
                write = write.uncertainty(uncertainty);
            }
        }
        write
    }
}

/// Run-level settings passed to [`RegisteredUnit::commit`].
#[derive(Debug, Clone, Copy)]
pub struct CommitContext<'a> {
    pub run_id: &'a str,
    pub verbose: bool,
    /// Outputs of units that have not committed yet.
    pub pending: &'a BTreeSet<String>,
    /// Outputs of failed or skipped units. Never produced in this run.
    pub unavailable: &'a BTreeSet<String>,
}

/// Checks held back until every path they read has been produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deferred {
    pub certificates: Vec<CertificateSpec>,
    pub gates: Vec<GateCheckSpec>,
}

impl Deferred {
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.gates.is_empty()
    }
}

/// Evaluate a certificate, failing it outright when it reads an unavailable path.
pub fn evaluate_certificate(
    spec: &CertificateSpec,
    unit_id: &str,
    registry: &ParameterRegistry,
    unavailable: &BTreeSet<String>,
) -> CertificateRecord {
    let missing = unavailable_paths(&spec.condition, unavailable);
    let certificate = if missing.is_empty() {
        spec.evaluate(unit_id, registry)
    } else {
        spec.unavailable(unit_id, missing)
    };
    if !certificate.passed() {
        warn!(unit = %unit_id, certificate = %certificate.id, "certificate failed");
    }
    certificate
}

/// Append a gate outcome, recording a failure when it reads an unavailable path.
pub fn record_gate(
    spec: &GateCheckSpec,
    unit_id: &str,
    registry: &ParameterRegistry,
    ledger: &mut GateLedger,
    run_id: &str,
    unavailable: &BTreeSet<String>,
) -> GateEntry {
    let entry = if unavailable_paths(&spec.condition, unavailable).is_empty() {
        ledger.record(run_id, unit_id, spec, registry)
    } else {
        ledger.record_unavailable(run_id, unit_id, spec)
    };
    if !entry.passed {
        warn!(unit = %unit_id, gate = %entry.gate_id, "gate check failed");
    }
    entry.clone()
}

fn unavailable_paths(condition: &Condition, unavailable: &BTreeSet<String>) -> Vec<String> {
    condition
        .paths()
        .into_iter()
        .filter(|path| unavailable.contains(path))
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
