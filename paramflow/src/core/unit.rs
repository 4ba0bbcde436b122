//! The simulation unit contract.
//!
//! A unit is a self-describing computation node. It declares the registry
//! paths it reads and the paths it produces, and computes its outputs from a
//! read-only [`InputView`] restricted to the declared inputs. Optional
//! features are advertised through [`Capabilities`] and only invoked when
//! declared.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::certificate::{CertificateSpec, SelfValidation};
use crate::core::error::UnitError;
use crate::core::gate::GateCheckSpec;
use crate::core::path::is_private;
use crate::core::registry::ParameterRegistry;
use crate::core::value::{ParamMetadata, Status, Value};

/// Static description of a unit: identity, routing tags, and its I/O contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub id: String,
    pub version: String,
    pub tags: BTreeSet<String>,
    pub required_inputs: BTreeSet<String>,
    pub output_params: BTreeSet<String>,
    /// Opaque formula identifiers; the engine never evaluates them.
    pub output_formulas: BTreeSet<String>,
}

impl UnitDescriptor {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            tags: BTreeSet::new(),
            required_inputs: BTreeSet::new(),
            output_params: BTreeSet::new(),
            output_formulas: BTreeSet::new(),
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn requires(mut self, paths: &[&str]) -> Self {
        self.required_inputs
            .extend(paths.iter().map(|path| path.to_string()));
        self
    }

    pub fn produces(mut self, paths: &[&str]) -> Self {
        self.output_params
            .extend(paths.iter().map(|path| path.to_string()));
        self
    }

    pub fn formulas(mut self, ids: &[&str]) -> Self {
        self.output_formulas.extend(ids.iter().map(|id| id.to_string()));
        self
    }
}

/// Optional interfaces a unit implements. Captured once at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub formulas: bool,
    pub output_definitions: bool,
    pub section_content: bool,
    pub certificates: bool,
    pub gate_checks: bool,
    pub self_validation: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_output_definitions(mut self) -> Self {
        self.output_definitions = true;
        self
    }

    pub fn with_certificates(mut self) -> Self {
        self.certificates = true;
        self
    }

    pub fn with_gate_checks(mut self) -> Self {
        self.gate_checks = true;
        self
    }

    pub fn with_self_validation(mut self) -> Self {
        self.self_validation = true;
        self
    }

    pub fn with_formulas(mut self) -> Self {
        self.formulas = true;
        self
    }

    pub fn with_section_content(mut self) -> Self {
        self.section_content = true;
        self
    }
}

/// How an output path is recorded in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub path: String,
    pub status: Status,
    pub uncertainty: Option<f64>,
    pub metadata: ParamMetadata,
}

impl OutputDefinition {
    pub fn new(path: &str, status: Status) -> Self {
        Self {
            path: path.to_string(),
            status,
            uncertainty: None,
            metadata: ParamMetadata::default(),
        }
    }

    pub fn uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn metadata(mut self, metadata: ParamMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Opaque reference to a formula rendered elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaRef {
    pub id: String,
    pub label: String,
}

/// Opaque reference to narrative content rendered elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRef {
    pub section_id: String,
    pub title: String,
}

/// Result map of a unit's `run`.
///
/// Keys using the private prefix (`_`) are diagnostics: reported, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: &str, value: impl Into<Value>) {
        self.values.insert(path.to_string(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Split into `(persisted, diagnostics)` by the private naming convention.
    pub fn partition(self) -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
        self.values.into_iter().partition(|(path, _)| !is_private(path))
    }
}

/// Read-only registry view limited to a unit's declared inputs.
pub struct InputView<'a> {
    registry: &'a ParameterRegistry,
    allowed: &'a BTreeSet<String>,
}

impl<'a> InputView<'a> {
    pub fn new(registry: &'a ParameterRegistry, allowed: &'a BTreeSet<String>) -> Self {
        Self { registry, allowed }
    }

    pub fn get(&self, path: &str) -> Result<&'a Value, UnitError> {
        if !self.allowed.contains(path) {
            return Err(UnitError::UndeclaredInput(path.to_string()));
        }
        self.registry
            .get_param(path)
            .map_err(|_| UnitError::MissingInput(path.to_string()))
    }

    pub fn number(&self, path: &str) -> Result<f64, UnitError> {
        self.get(path)?;
        Ok(self.registry.get_number(path)?)
    }

    pub fn pair(&self, path: &str) -> Result<(f64, f64), UnitError> {
        self.get(path)?;
        Ok(self.registry.get_pair(path)?)
    }

    pub fn label(&self, path: &str) -> Result<&'a str, UnitError> {
        self.get(path)?;
        Ok(self.registry.get_label(path)?)
    }
}

/// A computation node run by the orchestrator.
///
/// `run` must be a pure function of the values visible through the view.
/// The optional methods are only called when the matching flag is set in
/// [`SimulationUnit::capabilities`].
pub trait SimulationUnit: Send + Sync {
    fn descriptor(&self) -> &UnitDescriptor;

    fn run(&self, inputs: &InputView<'_>) -> Result<Outputs, UnitError>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    fn formulas(&self) -> Vec<FormulaRef> {
        Vec::new()
    }

    fn output_definitions(&self) -> Vec<OutputDefinition> {
        Vec::new()
    }

    fn section_content(&self) -> Option<SectionRef> {
        None
    }

    fn certificates(&self) -> Vec<CertificateSpec> {
        Vec::new()
    }

    fn gate_checks(&self) -> Vec<GateCheckSpec> {
        Vec::new()
    }

    /// Re-derive key claims from literal constants, bypassing the registry.
    fn validate_self(&self) -> Option<SelfValidation> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_limits_reads_to_declared_inputs() {
        let mut registry = ParameterRegistry::new();
        registry.establish("topology.b3", 24.0, "bootstrap").expect("b3");
        registry.establish("topology.chi", -144.0, "bootstrap").expect("chi");
        let allowed: BTreeSet<String> = ["topology.b3".to_string(), "topology.h11".to_string()]
            .into_iter()
            .collect();
        let view = InputView::new(&registry, &allowed);

        assert_eq!(view.number("topology.b3"), Ok(24.0));
        assert_eq!(
            view.number("topology.chi"),
            Err(UnitError::UndeclaredInput("topology.chi".to_string()))
        );
        assert_eq!(
            view.number("topology.h11"),
            Err(UnitError::MissingInput("topology.h11".to_string()))
        );
    }

    #[test]
    fn outputs_partition_private_keys() {
        let outputs = Outputs::new()
            .with("thermal.alpha_T", 2.7)
            .with("_debug.ratio", 0.26);
        let (persisted, diagnostics) = outputs.partition();
        assert_eq!(persisted.keys().collect::<Vec<_>>(), vec!["thermal.alpha_T"]);
        assert_eq!(diagnostics.keys().collect::<Vec<_>>(), vec!["_debug.ratio"]);
    }

    #[test]
    fn descriptor_builder_collects_paths() {
        let descriptor = UnitDescriptor::new("thermal", "1.0")
            .tag("thermal")
            .requires(&["topology.b3"])
            .produces(&["thermal.alpha_T"])
            .formulas(&["thermal-alpha"]);
        assert!(descriptor.required_inputs.contains("topology.b3"));
        assert!(descriptor.output_params.contains("thermal.alpha_T"));
        assert!(descriptor.output_formulas.contains("thermal-alpha"));
        assert!(descriptor.tags.contains("thermal"));
    }
}
