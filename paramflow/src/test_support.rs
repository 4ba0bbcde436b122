//! Test-only helpers: closure-backed units and scratch workspaces.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::certificate::{CertificateSpec, SelfValidation};
use crate::core::error::UnitError;
use crate::core::gate::GateCheckSpec;
use crate::core::unit::{
    Capabilities, InputView, OutputDefinition, Outputs, SimulationUnit, UnitDescriptor,
};

type RunFn = dyn Fn(&InputView<'_>) -> Result<Outputs, UnitError> + Send + Sync;

/// A unit whose `run` is a closure. Counts its invocations.
pub struct FnUnit {
    descriptor: UnitDescriptor,
    run: Box<RunFn>,
    calls: Arc<AtomicUsize>,
    definitions: Option<Vec<OutputDefinition>>,
    certificates: Option<Vec<CertificateSpec>>,
    gates: Option<Vec<GateCheckSpec>>,
    self_validation: Option<SelfValidation>,
}

impl FnUnit {
    pub fn new<F>(descriptor: UnitDescriptor, run: F) -> Self
    where
        F: Fn(&InputView<'_>) -> Result<Outputs, UnitError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            run: Box::new(run),
            calls: Arc::new(AtomicUsize::new(0)),
            definitions: None,
            certificates: None,
            gates: None,
            self_validation: None,
        }
    }

    /// A unit with no inputs that emits fixed numbers.
    pub fn constant(id: &str, outputs: &[(&str, f64)]) -> Self {
        let paths: Vec<&str> = outputs.iter().map(|(path, _)| *path).collect();
        let descriptor = UnitDescriptor::new(id, "1.0").produces(&paths);
        let values: Vec<(String, f64)> = outputs
            .iter()
            .map(|(path, value)| (path.to_string(), *value))
            .collect();
        Self::new(descriptor, move |_| {
            let mut out = Outputs::new();
            for (path, value) in &values {
                out.insert(path, *value);
            }
            Ok(out)
        })
    }

    /// A unit that sums its numeric inputs into each declared output.
    pub fn sum(id: &str, requires: &[&str], produces: &[&str]) -> Self {
        let descriptor = UnitDescriptor::new(id, "1.0")
            .requires(requires)
            .produces(produces);
        let inputs: Vec<String> = requires.iter().map(|path| path.to_string()).collect();
        let outputs: Vec<String> = produces.iter().map(|path| path.to_string()).collect();
        Self::new(descriptor, move |view| {
            let mut total = 0.0;
            for path in &inputs {
                total += view.number(path)?;
            }
            let mut out = Outputs::new();
            for path in &outputs {
                out.insert(path, total);
            }
            Ok(out)
        })
    }

    /// A unit whose `run` always fails.
    pub fn failing(id: &str, requires: &[&str], produces: &[&str]) -> Self {
        let descriptor = UnitDescriptor::new(id, "1.0")
            .requires(requires)
            .produces(produces);
        Self::new(descriptor, |_| Err(UnitError::Computation("boom".to_string())))
    }

    pub fn with_definitions(mut self, definitions: Vec<OutputDefinition>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn with_certificates(mut self, certificates: Vec<CertificateSpec>) -> Self {
        self.certificates = Some(certificates);
        self
    }

    pub fn with_gates(mut self, gates: Vec<GateCheckSpec>) -> Self {
        self.gates = Some(gates);
        self
    }

    pub fn with_self_validation(mut self, validation: SelfValidation) -> Self {
        self.self_validation = Some(validation);
        self
    }

    /// Shared invocation counter; survives moving the unit into an orchestrator.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl SimulationUnit for FnUnit {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn run(&self, inputs: &InputView<'_>) -> Result<Outputs, UnitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.run)(inputs)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            output_definitions: self.definitions.is_some(),
            certificates: self.certificates.is_some(),
            gate_checks: self.gates.is_some(),
            self_validation: self.self_validation.is_some(),
            ..Capabilities::none()
        }
    }

    fn output_definitions(&self) -> Vec<OutputDefinition> {
        self.definitions.clone().unwrap_or_default()
    }

    fn certificates(&self) -> Vec<CertificateSpec> {
        self.certificates.clone().unwrap_or_default()
    }

    fn gate_checks(&self) -> Vec<GateCheckSpec> {
        self.gates.clone().unwrap_or_default()
    }

    fn validate_self(&self) -> Option<SelfValidation> {
        self.self_validation.clone()
    }
}

/// Scratch directory for config, bootstrap, and report files.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` under the workspace and return its path.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
