//! Tolerance conditions, certificates, and self-validation results.
//!
//! Evaluation is a pure read of the registry: it never writes, and evaluating
//! the same condition twice against the same registry yields the same result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::registry::ParameterRegistry;
use crate::core::value::Value;

/// Which numeric component of a value an operand reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Scalar,
    First,
    Second,
}

/// A numeric read of one registry path.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub path: String,
    pub component: Component,
}

impl Operand {
    pub fn scalar(path: &str) -> Self {
        Self {
            path: path.to_string(),
            component: Component::Scalar,
        }
    }

    pub fn first(path: &str) -> Self {
        Self {
            path: path.to_string(),
            component: Component::First,
        }
    }

    pub fn second(path: &str) -> Self {
        Self {
            path: path.to_string(),
            component: Component::Second,
        }
    }

    fn resolve(&self, registry: &ParameterRegistry) -> Result<f64, String> {
        let value = registry
            .get_param(&self.path)
            .map_err(|err| err.to_string())?;
        match (value, self.component) {
            (Value::Number(v), Component::Scalar) => Ok(*v),
            (Value::Pair(a, _), Component::First) => Ok(*a),
            (Value::Pair(_, b), Component::Second) => Ok(*b),
            (other, component) => Err(format!(
                "'{}' is a {}, cannot read {:?} component",
                self.path,
                other.kind(),
                component
            )),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component {
            Component::Scalar => write!(f, "{}", self.path),
            Component::First => write!(f, "{}[0]", self.path),
            Component::Second => write!(f, "{}[1]", self.path),
        }
    }
}

/// Boolean condition over registry values and literal tolerances.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `|x - target| <= tolerance`
    Approx {
        operand: Operand,
        target: f64,
        tolerance: f64,
    },
    /// `|x - target| <= rel_tolerance * |target|`
    Relative {
        operand: Operand,
        target: f64,
        rel_tolerance: f64,
    },
    /// `min <= x <= max`
    Range { operand: Operand, min: f64, max: f64 },
    /// `x <= bound`
    Below { operand: Operand, bound: f64 },
    /// `x >= bound`
    Above { operand: Operand, bound: f64 },
    /// `|left - right| <= tolerance`
    Agree {
        left: Operand,
        right: Operand,
        tolerance: f64,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn approx(path: &str, target: f64, tolerance: f64) -> Self {
        Condition::Approx {
            operand: Operand::scalar(path),
            target,
            tolerance,
        }
    }

    pub fn relative(path: &str, target: f64, rel_tolerance: f64) -> Self {
        Condition::Relative {
            operand: Operand::scalar(path),
            target,
            rel_tolerance,
        }
    }

    pub fn range(path: &str, min: f64, max: f64) -> Self {
        Condition::Range {
            operand: Operand::scalar(path),
            min,
            max,
        }
    }

    pub fn below(path: &str, bound: f64) -> Self {
        Condition::Below {
            operand: Operand::scalar(path),
            bound,
        }
    }

    pub fn above(path: &str, bound: f64) -> Self {
        Condition::Above {
            operand: Operand::scalar(path),
            bound,
        }
    }

    pub fn agree(left: &str, right: &str, tolerance: f64) -> Self {
        Condition::Agree {
            left: Operand::scalar(left),
            right: Operand::scalar(right),
            tolerance,
        }
    }

    /// Registry paths referenced by this condition, sorted and deduplicated.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths.sort();
        paths.dedup();
        paths
    }

    fn collect_paths(&self, out: &mut Vec<String>) {
        match self {
            Condition::Approx { operand, .. }
            | Condition::Relative { operand, .. }
            | Condition::Range { operand, .. }
            | Condition::Below { operand, .. }
            | Condition::Above { operand, .. } => out.push(operand.path.clone()),
            Condition::Agree { left, right, .. } => {
                out.push(left.path.clone());
                out.push(right.path.clone());
            }
            Condition::All(children) | Condition::Any(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
        }
    }

    /// Literal tolerance of a leaf condition (`None` for bounds and compounds).
    pub fn tolerance(&self) -> Option<f64> {
        match self {
            Condition::Approx { tolerance, .. } | Condition::Agree { tolerance, .. } => {
                Some(*tolerance)
            }
            Condition::Relative {
                target,
                rel_tolerance,
                ..
            } => Some(rel_tolerance * target.abs()),
            _ => None,
        }
    }

    /// Evaluate against the registry.
    ///
    /// Missing paths or non-numeric operands make the evaluation fail; they
    /// are reported in the result rather than raised.
    pub fn evaluate(&self, registry: &ParameterRegistry) -> Evaluation {
        let missing_paths: Vec<String> = self
            .paths()
            .into_iter()
            .filter(|path| !registry.has_param(path))
            .collect();
        let mut evaluation = Evaluation {
            passed: false,
            computed_values: BTreeMap::new(),
            tolerance: self.tolerance(),
            missing_paths,
            message: None,
        };
        if !evaluation.missing_paths.is_empty() {
            evaluation.message = Some(format!(
                "unavailable: {}",
                evaluation.missing_paths.join(", ")
            ));
            return evaluation;
        }
        match self.check(registry, &mut evaluation.computed_values) {
            Ok(passed) => evaluation.passed = passed,
            Err(message) => evaluation.message = Some(message),
        }
        evaluation
    }

    fn check(
        &self,
        registry: &ParameterRegistry,
        computed: &mut BTreeMap<String, f64>,
    ) -> Result<bool, String> {
        match self {
            Condition::Approx {
                operand,
                target,
                tolerance,
            } => Ok((read(operand, registry, computed)? - target).abs() <= *tolerance),
            Condition::Relative {
                operand,
                target,
                rel_tolerance,
            } => {
                let value = read(operand, registry, computed)?;
                Ok((value - target).abs() <= rel_tolerance * target.abs())
            }
            Condition::Range { operand, min, max } => {
                let value = read(operand, registry, computed)?;
                Ok(*min <= value && value <= *max)
            }
            Condition::Below { operand, bound } => Ok(read(operand, registry, computed)? <= *bound),
            Condition::Above { operand, bound } => Ok(read(operand, registry, computed)? >= *bound),
            Condition::Agree {
                left,
                right,
                tolerance,
            } => {
                let left = read(left, registry, computed)?;
                let right = read(right, registry, computed)?;
                Ok((left - right).abs() <= *tolerance)
            }
            Condition::All(children) => {
                let mut passed = true;
                for child in children {
                    passed &= child.check(registry, computed)?;
                }
                Ok(passed)
            }
            Condition::Any(children) => {
                let mut passed = false;
                for child in children {
                    passed |= child.check(registry, computed)?;
                }
                Ok(passed)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Approx {
                operand,
                target,
                tolerance,
            } => write!(f, "|{operand} - {target}| <= {tolerance}"),
            Condition::Relative {
                operand,
                target,
                rel_tolerance,
            } => write!(f, "|{operand} - {target}| <= {rel_tolerance} * |{target}|"),
            Condition::Range { operand, min, max } => write!(f, "{min} <= {operand} <= {max}"),
            Condition::Below { operand, bound } => write!(f, "{operand} <= {bound}"),
            Condition::Above { operand, bound } => write!(f, "{operand} >= {bound}"),
            Condition::Agree {
                left,
                right,
                tolerance,
            } => write!(f, "|{left} - {right}| <= {tolerance}"),
            Condition::All(children) => write_joined(f, children, " && "),
            Condition::Any(children) => write_joined(f, children, " || "),
        }
    }
}

fn read(
    operand: &Operand,
    registry: &ParameterRegistry,
    computed: &mut BTreeMap<String, f64>,
) -> Result<f64, String> {
    let value = operand.resolve(registry)?;
    computed.insert(operand.to_string(), value);
    Ok(value)
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Condition], sep: &str) -> fmt::Result {
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({child})")?;
    }
    Ok(())
}

/// Outcome of evaluating a [`Condition`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub passed: bool,
    pub computed_values: BTreeMap<String, f64>,
    pub tolerance: Option<f64>,
    pub missing_paths: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertificateStatus {
    Pass,
    Fail,
}

impl CertificateStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            CertificateStatus::Pass
        } else {
            CertificateStatus::Fail
        }
    }
}

/// A tolerance-based assertion declared by a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateSpec {
    pub id: String,
    pub assertion: String,
    pub condition: Condition,
    pub external_reference: Option<String>,
}

impl CertificateSpec {
    pub fn new(id: &str, assertion: &str, condition: Condition) -> Self {
        Self {
            id: id.to_string(),
            assertion: assertion.to_string(),
            condition,
            external_reference: None,
        }
    }

    pub fn verified_by(mut self, reference: &str) -> Self {
        self.external_reference = Some(reference.to_string());
        self
    }

    /// Evaluate and record. Never writes to the registry.
    pub fn evaluate(&self, unit_id: &str, registry: &ParameterRegistry) -> CertificateRecord {
        let evaluation = self.condition.evaluate(registry);
        CertificateRecord {
            id: self.id.clone(),
            unit_id: unit_id.to_string(),
            assertion: self.assertion.clone(),
            condition: self.condition.to_string(),
            computed_values: evaluation.computed_values,
            tolerance: evaluation.tolerance,
            status: CertificateStatus::from_passed(evaluation.passed),
            missing_paths: evaluation.missing_paths,
            message: evaluation.message,
            external_reference: self.external_reference.clone(),
        }
    }
}

impl CertificateSpec {
    /// Record a `FAIL` without reading the registry: `missing` paths were
    /// never produced in this run, so any value held for them is stale.
    pub fn unavailable(&self, unit_id: &str, missing: Vec<String>) -> CertificateRecord {
        CertificateRecord {
            id: self.id.clone(),
            unit_id: unit_id.to_string(),
            assertion: self.assertion.clone(),
            condition: self.condition.to_string(),
            computed_values: BTreeMap::new(),
            tolerance: self.condition.tolerance(),
            status: CertificateStatus::Fail,
            message: Some(format!(
                "inputs unavailable after upstream failure: {}",
                missing.join(", ")
            )),
            missing_paths: missing,
            external_reference: self.external_reference.clone(),
        }
    }
}

/// Recorded outcome of a certificate. Append-only once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: String,
    pub unit_id: String,
    pub assertion: String,
    pub condition: String,
    pub computed_values: BTreeMap<String, f64>,
    pub tolerance: Option<f64>,
    pub status: CertificateStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub external_reference: Option<String>,
}

impl CertificateRecord {
    pub fn passed(&self) -> bool {
        self.status == CertificateStatus::Pass
    }
}

/// One named check inside a self-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl ValidationCheck {
    pub fn new(name: &str, passed: bool, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed,
            message: message.to_string(),
        }
    }

    /// Compare a re-derived value against its expected literal.
    pub fn approx(name: &str, computed: f64, expected: f64, tolerance: f64) -> Self {
        let deviation = (computed - expected).abs();
        Self {
            name: name.to_string(),
            passed: deviation <= tolerance,
            message: format!(
                "computed {computed}, expected {expected} (deviation {deviation:.3e}, tolerance {tolerance})"
            ),
        }
    }
}

/// Independent re-derivation of a unit's key claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfValidation {
    pub passed: bool,
    pub checks: Vec<ValidationCheck>,
}

impl SelfValidation {
    pub fn from_checks(checks: Vec<ValidationCheck>) -> Self {
        Self {
            passed: checks.iter().all(|check| check.passed),
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry.establish("topology.b3", 24.0, "bootstrap").expect("b3");
        registry.set_param("thermal.alpha_T", 2.7, "unit").expect("alpha");
        registry
            .set_param("mass.window", (1.0, 3.0), "unit")
            .expect("window");
        registry.set_param("g2.holonomy", "G2", "unit").expect("label");
        registry
    }

    #[test]
    fn approx_reports_values_and_tolerance() {
        let evaluation = Condition::approx("thermal.alpha_T", 2.7, 0.1).evaluate(&registry());
        assert!(evaluation.passed);
        assert_eq!(evaluation.tolerance, Some(0.1));
        assert_eq!(evaluation.computed_values.get("thermal.alpha_T"), Some(&2.7));
    }

    #[test]
    fn bounds_and_pairs_evaluate() {
        let registry = registry();
        assert!(Condition::range("topology.b3", 20.0, 30.0).evaluate(&registry).passed);
        assert!(!Condition::below("topology.b3", 10.0).evaluate(&registry).passed);
        assert!(Condition::above("topology.b3", 24.0).evaluate(&registry).passed);
        assert!(Condition::relative("topology.b3", 25.0, 0.05).evaluate(&registry).passed);

        let pair = Condition::Range {
            operand: Operand::second("mass.window"),
            min: 2.5,
            max: 3.5,
        };
        let evaluation = pair.evaluate(&registry);
        assert!(evaluation.passed);
        assert_eq!(evaluation.computed_values.get("mass.window[1]"), Some(&3.0));
    }

    #[test]
    fn missing_paths_fail_without_raising() {
        let evaluation =
            Condition::agree("thermal.alpha_T", "thermal.beta", 0.1).evaluate(&registry());
        assert!(!evaluation.passed);
        assert_eq!(evaluation.missing_paths, vec!["thermal.beta".to_string()]);
    }

    #[test]
    fn label_operand_fails_with_message() {
        let evaluation = Condition::approx("g2.holonomy", 1.0, 0.1).evaluate(&registry());
        assert!(!evaluation.passed);
        assert!(evaluation.message.expect("message").contains("label"));
    }

    #[test]
    fn compound_conditions_render_and_combine() {
        let condition = Condition::All(vec![
            Condition::approx("thermal.alpha_T", 2.7, 0.1),
            Condition::Any(vec![
                Condition::below("topology.b3", 1.0),
                Condition::above("topology.b3", 1.0),
            ]),
        ]);
        assert!(condition.evaluate(&registry()).passed);
        assert_eq!(
            condition.to_string(),
            "(|thermal.alpha_T - 2.7| <= 0.1) && ((topology.b3 <= 1) || (topology.b3 >= 1))"
        );
        assert_eq!(
            condition.paths(),
            vec!["thermal.alpha_T".to_string(), "topology.b3".to_string()]
        );
    }

    /// Evaluating twice against the same registry gives identical records and no writes.
    #[test]
    fn certificate_evaluation_is_deterministic_and_read_only() {
        let registry = registry();
        let history_before = registry.history().len();
        let spec = CertificateSpec::new(
            "CERT_ALPHA_T",
            "alpha_T is close to 2.7",
            Condition::approx("thermal.alpha_T", 2.7, 0.1),
        )
        .verified_by("lattice-2024");

        let first = spec.evaluate("thermal", &registry);
        let second = spec.evaluate("thermal", &registry);
        assert_eq!(first, second);
        assert!(first.passed());
        assert_eq!(first.external_reference.as_deref(), Some("lattice-2024"));
        assert_eq!(registry.history().len(), history_before);
    }

    #[test]
    fn self_validation_passes_only_when_all_checks_pass() {
        let ok = SelfValidation::from_checks(vec![
            ValidationCheck::approx("alpha", 2.7000001, 2.7, 1e-6),
            ValidationCheck::new("sign", true, "positive"),
        ]);
        assert!(ok.passed);

        let bad = SelfValidation::from_checks(vec![
            ValidationCheck::approx("alpha", 2.8, 2.7, 1e-6),
            ValidationCheck::new("sign", true, "positive"),
        ]);
        assert!(!bad.passed);
        assert!(!bad.checks[0].passed);
    }
}
