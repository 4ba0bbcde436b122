//! Registration-time invariants for a single unit.

use std::collections::HashSet;

use crate::core::path::{is_private, is_valid_path};
use crate::core::unit::{Capabilities, SimulationUnit};
use crate::core::value::Status;

/// Check a unit's declarations before it joins the unit set:
/// - Non-blank id and version
/// - Well-formed, non-private input and output paths
/// - No path both required and produced by the same unit
/// - Output definitions cover declared outputs only, never as `ESTABLISHED`
/// - Certificate and gate ids are non-blank and unique per unit
///
/// Returns a list of stable error messages (empty on success).
pub fn validate_unit(unit: &dyn SimulationUnit, caps: Capabilities) -> Vec<String> {
    let descriptor = unit.descriptor();
    let mut errors = Vec::new();

    if descriptor.id.trim().is_empty() {
        errors.push("id must not be blank".to_string());
    }
    if descriptor.version.trim().is_empty() {
        errors.push("version must not be blank".to_string());
    }

    for (kind, paths) in [
        ("required input", &descriptor.required_inputs),
        ("output", &descriptor.output_params),
    ] {
        for path in paths {
            if !is_valid_path(path) {
                errors.push(format!("{kind} '{path}' is not a valid path"));
            } else if is_private(path) {
                errors.push(format!("{kind} '{path}' uses the private prefix"));
            }
        }
    }

    for path in descriptor
        .required_inputs
        .intersection(&descriptor.output_params)
    {
        errors.push(format!("'{path}' is both required and produced"));
    }

    if caps.output_definitions {
        let mut seen = HashSet::new();
        for definition in unit.output_definitions() {
            if !seen.insert(definition.path.clone()) {
                errors.push(format!("duplicate output definition '{}'", definition.path));
            }
            if !descriptor.output_params.contains(&definition.path) {
                errors.push(format!(
                    "output definition '{}' is not a declared output",
                    definition.path
                ));
            }
            if definition.status == Status::Established {
                errors.push(format!(
                    "output '{}' cannot be defined as ESTABLISHED",
                    definition.path
                ));
            }
            if let Some(uncertainty) = definition.uncertainty
                && !(uncertainty.is_finite() && uncertainty >= 0.0)
            {
                errors.push(format!(
                    "output '{}' uncertainty must be finite and >= 0",
                    definition.path
                ));
            }
            for message in definition.metadata.validate() {
                errors.push(format!("output '{}': {message}", definition.path));
            }
        }
    }

    if caps.certificates {
        let ids = unit.certificates().into_iter().map(|spec| spec.id);
        check_ids("certificate", ids, &mut errors);
    }
    if caps.gate_checks {
        let ids = unit.gate_checks().into_iter().map(|spec| spec.gate_id);
        check_ids("gate check", ids, &mut errors);
    }

    errors
}

fn check_ids(kind: &str, ids: impl Iterator<Item = String>, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            errors.push(format!("{kind} id must not be blank"));
        } else if !seen.insert(id.clone()) {
            errors.push(format!("duplicate {kind} id '{id}'"));
        }
    }
}
