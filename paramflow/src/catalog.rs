//! Demonstration units used by the CLI.
//!
//! The chain is small on purpose: `thermal-alpha` reads the bootstrapped
//! `topology.b3`, `mode-count` reads it independently, and `thermal-shift`
//! joins both. The first two share a wavefront.

use std::f64::consts::PI;

use crate::core::certificate::{CertificateSpec, Condition, SelfValidation, ValidationCheck};
use crate::core::error::{EngineError, UnitError};
use crate::core::gate::GateCheckSpec;
use crate::core::unit::{
    Capabilities, FormulaRef, InputView, OutputDefinition, Outputs, SectionRef, SimulationUnit,
    UnitDescriptor,
};
use crate::core::value::{BoundType, ParamMetadata, Status};
use crate::orchestrator::Orchestrator;

/// Thermal coupling normalization.
pub const THERMAL_SCALE: f64 = 10.313240;
/// Third Betti number of the reference topology.
pub const REFERENCE_B3: f64 = 24.0;

fn alpha_t(b3: f64) -> f64 {
    2.0 * PI / b3 * THERMAL_SCALE
}

/// `thermal.alpha_T = (2π / b3) · 10.313240`.
pub struct ThermalAlpha {
    descriptor: UnitDescriptor,
}

impl ThermalAlpha {
    pub fn new() -> Self {
        Self {
            descriptor: UnitDescriptor::new("thermal-alpha", "1.0")
                .tag("thermal")
                .requires(&["topology.b3"])
                .produces(&["thermal.alpha_T"])
                .formulas(&["thermal-alpha-t"]),
        }
    }
}

impl Default for ThermalAlpha {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationUnit for ThermalAlpha {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn run(&self, inputs: &InputView<'_>) -> Result<Outputs, UnitError> {
        let b3 = inputs.number("topology.b3")?;
        if b3 <= 0.0 {
            return Err(UnitError::Computation(format!(
                "topology.b3 must be positive, got {b3}"
            )));
        }
        Ok(Outputs::new()
            .with("thermal.alpha_T", alpha_t(b3))
            .with("_thermal.ratio", 2.0 * PI / b3))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with_formulas()
            .with_output_definitions()
            .with_section_content()
            .with_certificates()
            .with_self_validation()
    }

    fn formulas(&self) -> Vec<FormulaRef> {
        vec![FormulaRef {
            id: "thermal-alpha-t".to_string(),
            label: "alpha_T = (2 pi / b3) * 10.313240".to_string(),
        }]
    }

    fn output_definitions(&self) -> Vec<OutputDefinition> {
        vec![
            OutputDefinition::new("thermal.alpha_T", Status::Derived).metadata(
                ParamMetadata::described("thermal coupling from the b3 topology")
                    .with_units("dimensionless"),
            ),
        ]
    }

    fn section_content(&self) -> Option<SectionRef> {
        Some(SectionRef {
            section_id: "thermal".to_string(),
            title: "Thermal coupling".to_string(),
        })
    }

    fn certificates(&self) -> Vec<CertificateSpec> {
        vec![
            CertificateSpec::new(
                "CERT_ALPHA_T",
                "alpha_T lies within 0.1 of 2.7",
                Condition::approx("thermal.alpha_T", 2.7, 0.1),
            )
            .verified_by("closed-form evaluation at b3 = 24"),
        ]
    }

    fn validate_self(&self) -> Option<SelfValidation> {
        Some(SelfValidation::from_checks(vec![ValidationCheck::approx(
            "alpha_T at reference b3",
            alpha_t(REFERENCE_B3),
            2.7,
            1e-6,
        )]))
    }
}

/// `modes.count = b3 / 2`, plus a regime label.
pub struct ModeCount {
    descriptor: UnitDescriptor,
}

impl ModeCount {
    pub fn new() -> Self {
        Self {
            descriptor: UnitDescriptor::new("mode-count", "1.0")
                .tag("geometry")
                .requires(&["topology.b3"])
                .produces(&["modes.count", "modes.regime"]),
        }
    }
}

impl Default for ModeCount {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationUnit for ModeCount {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn run(&self, inputs: &InputView<'_>) -> Result<Outputs, UnitError> {
        let b3 = inputs.number("topology.b3")?;
        let count = (b3 / 2.0).floor();
        let regime = if count >= 10.0 { "rich" } else { "sparse" };
        Ok(Outputs::new()
            .with("modes.count", count)
            .with("modes.regime", regime))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_output_definitions()
    }

    fn output_definitions(&self) -> Vec<OutputDefinition> {
        vec![
            OutputDefinition::new("modes.count", Status::Geometric)
                .metadata(ParamMetadata::described("paired harmonic modes")),
            OutputDefinition::new("modes.regime", Status::Geometric),
        ]
    }
}

/// `thermal.shift = alpha_T · modes.count`, bounded by a gate check.
pub struct ThermalShift {
    descriptor: UnitDescriptor,
}

impl ThermalShift {
    pub fn new() -> Self {
        Self {
            descriptor: UnitDescriptor::new("thermal-shift", "1.0")
                .tag("thermal")
                .requires(&["thermal.alpha_T", "modes.count"])
                .produces(&["thermal.shift"]),
        }
    }
}

impl Default for ThermalShift {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationUnit for ThermalShift {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    fn run(&self, inputs: &InputView<'_>) -> Result<Outputs, UnitError> {
        let alpha = inputs.number("thermal.alpha_T")?;
        let count = inputs.number("modes.count")?;
        Ok(Outputs::new().with("thermal.shift", alpha * count))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with_output_definitions()
            .with_gate_checks()
    }

    fn output_definitions(&self) -> Vec<OutputDefinition> {
        vec![
            OutputDefinition::new("thermal.shift", Status::Predicted)
                .uncertainty(0.5)
                .metadata(
                    ParamMetadata::described("collective thermal shift")
                        .with_bound(BoundType::Range, "mode sum over the reference topology"),
                ),
        ]
    }

    fn gate_checks(&self) -> Vec<GateCheckSpec> {
        vec![GateCheckSpec::new(
            "GATE_THERMAL_SHIFT",
            "collective shift stays within [20, 40]",
            Condition::range("thermal.shift", 20.0, 40.0),
        )]
    }
}

/// All demo units, in declaration order.
pub fn demo_units() -> Vec<Box<dyn SimulationUnit>> {
    vec![
        Box::new(ThermalShift::new()),
        Box::new(ThermalAlpha::new()),
        Box::new(ModeCount::new()),
    ]
}

pub fn register_demo_units(orchestrator: &mut Orchestrator) -> Result<(), EngineError> {
    for unit in demo_units() {
        orchestrator.register_boxed(unit)?;
    }
    Ok(())
}
