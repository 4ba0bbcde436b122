//! Orchestration of a full run: registration, pre-flight, ordered execution.
//!
//! A run either fails pre-flight with a structural [`EngineError`] and leaves
//! the registry untouched, or executes units in dependency order. Failure
//! handling depends on [`ErrorMode`]; how independent units are scheduled
//! depends on [`Strategy`].

use std::collections::BTreeSet;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::RunReport;
use crate::core::error::{EngineError, UnitError};
use crate::core::gate::GateLedger;
use crate::core::registry::ParameterRegistry;
use crate::core::resolver::{ExecutionPlan, resolve};
use crate::core::types::{ExecutionRecord, UnitState};
use crate::core::unit::{Outputs, SimulationUnit, UnitDescriptor};
use crate::execute::{
    CommitContext, Deferred, RegisteredUnit, evaluate_certificate, record_gate,
};

/// What happens after a unit fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    /// Stop at the first failure. Outputs already written stay written.
    #[default]
    Abort,
    /// Record the failure and skip every unit that depends on it.
    Continue,
}

/// How independent units are scheduled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One unit at a time in topological order.
    #[default]
    Sequential,
    /// Kahn levels: a level's units compute in parallel against the same
    /// registry state, then their writes apply in declaration order.
    Wavefront,
}

/// Run-level settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub error_mode: ErrorMode,
    pub strategy: Strategy,
    /// Log every written value at info level.
    pub verbose: bool,
    /// Ledger run id; generated from the clock when absent.
    pub run_id: Option<String>,
}

/// Resolved plan expressed in unit ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanView {
    pub order: Vec<String>,
    pub levels: Vec<Vec<String>>,
}

/// Registered units plus the settings to run them with.
pub struct Orchestrator {
    units: Vec<RegisteredUnit>,
    config: OrchestratorConfig,
}

/// Outcome of the read-only phase for one unit.
enum Computed {
    Ready(Outputs),
    Failed(UnitError),
    Skipped(Vec<String>),
}

/// Mutable state threaded through a run.
struct RunState<'a> {
    run_id: &'a str,
    records: Vec<ExecutionRecord>,
    /// Outputs of units that have not committed, failed, or been skipped yet.
    pending: BTreeSet<String>,
    unavailable: BTreeSet<String>,
    deferred: Vec<(usize, Deferred)>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            units: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate and add a unit. Declaration order breaks ordering ties.
    pub fn register<U: SimulationUnit + 'static>(&mut self, unit: U) -> Result<(), EngineError> {
        self.register_boxed(Box::new(unit))
    }

    pub fn register_boxed(&mut self, unit: Box<dyn SimulationUnit>) -> Result<(), EngineError> {
        let registered = RegisteredUnit::new(unit)?;
        if self.units.iter().any(|existing| existing.id() == registered.id()) {
            return Err(EngineError::DuplicateUnit(registered.id().to_string()));
        }
        debug!(unit = %registered.id(), "registered");
        self.units.push(registered);
        Ok(())
    }

    pub fn units(&self) -> impl Iterator<Item = &RegisteredUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Pre-flight only. Never touches the registry.
    pub fn plan(&self, registry: &ParameterRegistry) -> Result<PlanView, EngineError> {
        let plan = self.resolve(registry)?;
        let id = |idx: &usize| self.units[*idx].id().to_string();
        Ok(PlanView {
            order: plan.order.iter().map(id).collect(),
            levels: plan
                .levels
                .iter()
                .map(|level| level.iter().map(id).collect())
                .collect(),
        })
    }

    /// Resolve and execute every registered unit.
    ///
    /// Structural errors are returned before any unit runs. In
    /// [`ErrorMode::Abort`] the first unit failure is returned as
    /// [`EngineError::UnitExecution`]; in [`ErrorMode::Continue`] failures are
    /// recorded in the report instead.
    pub fn run(
        &self,
        registry: &mut ParameterRegistry,
        ledger: &mut GateLedger,
    ) -> Result<RunReport, EngineError> {
        let plan = self.resolve(registry)?;
        let run_id = self
            .config
            .run_id
            .clone()
            .unwrap_or_else(|| Utc::now().format("run-%Y%m%dT%H%M%S%.3fZ").to_string());
        info!(
            run_id = %run_id,
            units = self.units.len(),
            levels = plan.levels.len(),
            strategy = ?self.config.strategy,
            "pre-flight passed"
        );

        let mut state = RunState {
            run_id: &run_id,
            records: self
                .units
                .iter()
                .map(|unit| {
                    let descriptor = unit.descriptor();
                    ExecutionRecord::pending(&descriptor.id, &descriptor.version)
                })
                .collect(),
            pending: plan.producers.keys().cloned().collect(),
            unavailable: BTreeSet::new(),
            deferred: Vec::new(),
        };

        match self.config.strategy {
            Strategy::Sequential => {
                for &idx in &plan.order {
                    let computed = self.compute(idx, registry, &state.unavailable);
                    self.apply(idx, computed, registry, ledger, &mut state)?;
                }
            }
            Strategy::Wavefront => {
                for level in &plan.levels {
                    let snapshot: &ParameterRegistry = registry;
                    let unavailable = &state.unavailable;
                    let computed: Vec<(usize, Computed)> = level
                        .par_iter()
                        .map(|&idx| (idx, self.compute(idx, snapshot, unavailable)))
                        .collect();
                    for (idx, result) in computed {
                        self.apply(idx, result, registry, ledger, &mut state)?;
                    }
                }
            }
        }

        for (idx, deferred) in std::mem::take(&mut state.deferred) {
            let unit_id = self.units[idx].id();
            let record = &mut state.records[idx];
            for spec in &deferred.certificates {
                let certificate =
                    evaluate_certificate(spec, unit_id, registry, &state.unavailable);
                record.certificates.push(certificate);
            }
            for spec in &deferred.gates {
                let entry =
                    record_gate(spec, unit_id, registry, ledger, &run_id, &state.unavailable);
                record.gate_entries.push(entry);
            }
        }

        let order: Vec<usize> = match self.config.strategy {
            Strategy::Sequential => plan.order.clone(),
            Strategy::Wavefront => plan.levels.iter().flatten().copied().collect(),
        };
        let mut slots: Vec<Option<ExecutionRecord>> =
            state.records.into_iter().map(Some).collect();
        let records: Vec<ExecutionRecord> = order
            .iter()
            .filter_map(|&idx| slots[idx].take())
            .collect();

        let report = RunReport::new(&run_id, records, registry);
        info!(
            run_id = %run_id,
            completed = report.summary.units_completed,
            failed = report.summary.units_failed,
            skipped = report.summary.units_skipped,
            certificates_failed = report.summary.certificates_failed,
            "run finished"
        );
        Ok(report)
    }

    fn resolve(&self, registry: &ParameterRegistry) -> Result<ExecutionPlan, EngineError> {
        let descriptors: Vec<&UnitDescriptor> =
            self.units.iter().map(RegisteredUnit::descriptor).collect();
        resolve(&descriptors, registry)
    }

    fn compute(
        &self,
        idx: usize,
        registry: &ParameterRegistry,
        unavailable: &BTreeSet<String>,
    ) -> Computed {
        let unit = &self.units[idx];
        let blocked: Vec<String> = unit
            .descriptor()
            .required_inputs
            .intersection(unavailable)
            .cloned()
            .collect();
        if !blocked.is_empty() {
            return Computed::Skipped(blocked);
        }
        match unit.compute(registry) {
            Ok(outputs) => Computed::Ready(outputs),
            Err(err) => Computed::Failed(err),
        }
    }

    fn apply(
        &self,
        idx: usize,
        computed: Computed,
        registry: &mut ParameterRegistry,
        ledger: &mut GateLedger,
        state: &mut RunState<'_>,
    ) -> Result<(), EngineError> {
        let unit = &self.units[idx];
        let outcome = match computed {
            Computed::Ready(outputs) => {
                let context = CommitContext {
                    run_id: state.run_id,
                    verbose: self.config.verbose,
                    pending: &state.pending,
                    unavailable: &state.unavailable,
                };
                unit.commit(outputs, registry, ledger, &context, &mut state.records[idx])
            }
            Computed::Failed(err) => Err(err),
            Computed::Skipped(paths) => {
                debug!(unit = %unit.id(), inputs = ?paths, "skipped");
                let record = &mut state.records[idx];
                record.state = UnitState::Skipped;
                record.error = Some(UnitError::UnresolvableDependency(paths).to_string());
                self.mark_unavailable(idx, state);
                return Ok(());
            }
        };

        match outcome {
            Ok(deferred) => {
                debug!(unit = %unit.id(), "completed");
                self.settle(idx, state);
                if !deferred.is_empty() {
                    state.deferred.push((idx, deferred));
                }
                Ok(())
            }
            Err(err) => {
                warn!(unit = %unit.id(), error = %err, "unit failed");
                let record = &mut state.records[idx];
                record.state = UnitState::Failed;
                record.error = Some(err.to_string());
                match self.config.error_mode {
                    ErrorMode::Abort => Err(EngineError::UnitExecution {
                        unit_id: unit.id().to_string(),
                        source: err,
                    }),
                    ErrorMode::Continue => {
                        self.mark_unavailable(idx, state);
                        Ok(())
                    }
                }
            }
        }
    }

    /// The unit's outputs are no longer pending, whatever its outcome.
    fn settle(&self, idx: usize, state: &mut RunState<'_>) {
        for path in &self.units[idx].descriptor().output_params {
            state.pending.remove(path);
        }
    }

    /// Outputs of a failed or skipped unit that were not written are
    /// unavailable to its dependents and to deferred checks.
    fn mark_unavailable(&self, idx: usize, state: &mut RunState<'_>) {
        self.settle(idx, state);
        let written = &state.records[idx].outputs_written;
        let missing: Vec<String> = self.units[idx]
            .descriptor()
            .output_params
            .iter()
            .filter(|path| !written.contains(path))
            .cloned()
            .collect();
        state.unavailable.extend(missing);
    }
}
