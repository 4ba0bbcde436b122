//! Registry value types: values, statuses, and write-time metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest label accepted by the registry, in bytes.
pub const MAX_LABEL_LEN: usize = 128;

/// A parameter value.
///
/// Serialized untagged: a JSON number, a two-element array, or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Pair(f64, f64),
    Label(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(f64, f64)> {
        match self {
            Value::Pair(a, b) => Some((*a, *b)),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Value::Label(label) => Some(label.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Pair(..) => "pair",
            Value::Label(_) => "label",
        }
    }

    /// Check the value is storable (no NaN, bounded non-empty labels).
    pub fn check(&self) -> Result<(), String> {
        match self {
            Value::Number(v) if v.is_nan() => Err("number is NaN".to_string()),
            Value::Pair(a, b) if a.is_nan() || b.is_nan() => {
                Err("pair contains NaN".to_string())
            }
            Value::Label(label) if label.trim().is_empty() => {
                Err("label must be non-empty".to_string())
            }
            Value::Label(label) if label.len() > MAX_LABEL_LEN => Err(format!(
                "label exceeds {MAX_LABEL_LEN} bytes ({})",
                label.len()
            )),
            _ => Ok(()),
        }
    }

    /// Canonical byte encoding used for fingerprints.
    ///
    /// Floats are encoded by bit pattern so equal encodings mean bit-identical values.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Value::Number(v) => {
                buf.push(b'n');
                buf.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            Value::Pair(a, b) => {
                buf.push(b'p');
                buf.extend_from_slice(&a.to_bits().to_be_bytes());
                buf.extend_from_slice(&b.to_bits().to_be_bytes());
            }
            Value::Label(label) => {
                buf.push(b'l');
                buf.extend_from_slice(&(label.len() as u64).to_be_bytes());
                buf.extend_from_slice(label.as_bytes());
            }
        }
        buf
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Pair(a, b) => write!(f, "({a}, {b})"),
            Value::Label(label) => write!(f, "{label:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<(f64, f64)> for Value {
    fn from((a, b): (f64, f64)) -> Self {
        Value::Pair(a, b)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Label(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Label(value)
    }
}

/// Epistemic status of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Externally sourced ground truth. Write-once.
    Established,
    Derived,
    Geometric,
    Predicted,
    Foundational,
    Speculative,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Established => "ESTABLISHED",
            Status::Derived => "DERIVED",
            Status::Geometric => "GEOMETRIC",
            Status::Predicted => "PREDICTED",
            Status::Foundational => "FOUNDATIONAL",
            Status::Speculative => "SPECULATIVE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of experimental bound a value is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundType {
    Upper,
    Lower,
    Range,
    Exact,
}

/// Fixed optional-field metadata attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamMetadata {
    pub description: Option<String>,
    pub units: Option<String>,
    pub bound_type: Option<BoundType>,
    pub bound_source: Option<String>,
}

impl ParamMetadata {
    pub fn described(description: &str) -> Self {
        Self {
            description: Some(description.to_string()),
            ..Self::default()
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn with_bound(mut self, bound_type: BoundType, bound_source: &str) -> Self {
        self.bound_type = Some(bound_type);
        self.bound_source = Some(bound_source.to_string());
        self
    }

    /// Return stable error messages for malformed metadata (empty on success).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("description", &self.description),
            ("units", &self.units),
            ("bound_source", &self.bound_source),
        ] {
            if let Some(text) = value
                && text.trim().is_empty()
            {
                errors.push(format!("{field} must not be blank when present"));
            }
        }
        if self.bound_source.is_some() && self.bound_type.is_none() {
            errors.push("bound_source requires bound_type".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_deserialize_untagged() {
        let number: Value = serde_json::from_str("24").expect("number");
        let pair: Value = serde_json::from_str("[1.5, -2.0]").expect("pair");
        let label: Value = serde_json::from_str("\"G2\"").expect("label");
        assert_eq!(number, Value::Number(24.0));
        assert_eq!(pair, Value::Pair(1.5, -2.0));
        assert_eq!(label, Value::Label("G2".to_string()));
    }

    #[test]
    fn check_rejects_nan_and_long_labels() {
        assert!(Value::Number(f64::NAN).check().is_err());
        assert!(Value::Pair(1.0, f64::NAN).check().is_err());
        assert!(Value::Label(" ".to_string()).check().is_err());
        assert!(Value::Label("x".repeat(MAX_LABEL_LEN + 1)).check().is_err());
        assert!(Value::Number(f64::INFINITY).check().is_ok());
        assert!(Value::Label("Spin(7)".to_string()).check().is_ok());
    }

    #[test]
    fn canonical_bytes_distinguish_signed_zero() {
        assert_ne!(
            Value::Number(0.0).canonical_bytes(),
            Value::Number(-0.0).canonical_bytes()
        );
        assert_eq!(
            Value::Pair(1.0, 2.0).canonical_bytes(),
            Value::from((1.0, 2.0)).canonical_bytes()
        );
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&Status::Established).expect("status json");
        assert_eq!(json, "\"ESTABLISHED\"");
        assert_eq!(Status::Predicted.to_string(), "PREDICTED");
    }

    #[test]
    fn metadata_validation_reports_blank_fields_and_orphan_source() {
        let meta = ParamMetadata {
            description: Some("  ".to_string()),
            units: None,
            bound_type: None,
            bound_source: Some("PDG 2024".to_string()),
        };
        let errors = meta.validate();
        assert_eq!(
            errors,
            vec![
                "description must not be blank when present".to_string(),
                "bound_source requires bound_type".to_string(),
            ]
        );

        let ok = ParamMetadata::described("Planck mass")
            .with_units("GeV")
            .with_bound(BoundType::Exact, "CODATA");
        assert!(ok.validate().is_empty());
    }
}
