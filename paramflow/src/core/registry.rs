//! Provenance-tracked parameter registry.
//!
//! The registry is the only shared mutable resource of a run. Every successful
//! write appends a [`ProvenanceRecord`] to a history log that is never
//! truncated, so "who set this, when, from what" stays answerable after a
//! value is replaced.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::error::RegistryError;
use crate::core::path::{is_private, is_valid_path};
use crate::core::value::{ParamMetadata, Status, Value};

/// Current value of a registry path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub path: String,
    pub value: Value,
    pub source: String,
    pub status: Status,
    pub uncertainty: Option<f64>,
    pub metadata: ParamMetadata,
    /// Unit that produced the value (`None` for bootstrap or direct writes).
    pub written_by: Option<String>,
    /// Sequence number of the history record that produced this entry.
    pub revision: u64,
}

/// One successful write, as recorded in the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub seq: u64,
    pub path: String,
    pub value: Value,
    pub source: String,
    pub status: Status,
    pub uncertainty: Option<f64>,
    pub written_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Full-form write request.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamWrite {
    pub path: String,
    pub value: Value,
    pub source: String,
    pub status: Status,
    pub uncertainty: Option<f64>,
    pub metadata: ParamMetadata,
    pub written_by: Option<String>,
}

impl ParamWrite {
    /// A `DERIVED` write with no uncertainty and empty metadata.
    pub fn new(path: &str, value: impl Into<Value>, source: &str) -> Self {
        Self {
            path: path.to_string(),
            value: value.into(),
            source: source.to_string(),
            status: Status::Derived,
            uncertainty: None,
            metadata: ParamMetadata::default(),
            written_by: None,
        }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn metadata(mut self, metadata: ParamMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn written_by(mut self, unit_id: &str) -> Self {
        self.written_by = Some(unit_id.to_string());
        self
    }
}

/// Path-addressed store of provenance-tagged values.
///
/// Instances created with [`ParameterRegistry::new`] are fully isolated. The
/// engine always receives the registry explicitly; [`default_registry`] exists
/// for callers that want a process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    entries: BTreeMap<String, ParameterEntry>,
    history: Vec<ProvenanceRecord>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_param(&self, path: &str) -> Result<&Value, RegistryError> {
        self.entries
            .get(path)
            .map(|entry| &entry.value)
            .ok_or_else(|| RegistryError::MissingParameter(path.to_string()))
    }

    pub fn get_number(&self, path: &str) -> Result<f64, RegistryError> {
        let value = self.get_param(path)?;
        value
            .as_number()
            .ok_or_else(|| type_mismatch(path, "number", value))
    }

    pub fn get_pair(&self, path: &str) -> Result<(f64, f64), RegistryError> {
        let value = self.get_param(path)?;
        value
            .as_pair()
            .ok_or_else(|| type_mismatch(path, "pair", value))
    }

    pub fn get_label(&self, path: &str) -> Result<&str, RegistryError> {
        let value = self.get_param(path)?;
        value
            .as_label()
            .ok_or_else(|| type_mismatch(path, "label", value))
    }

    pub fn entry(&self, path: &str) -> Option<&ParameterEntry> {
        self.entries.get(path)
    }

    pub fn has_param(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// True if `path` exists with status `ESTABLISHED`.
    pub fn is_established(&self, path: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.status == Status::Established)
    }

    /// Write a `DERIVED` value with no uncertainty and empty metadata.
    pub fn set_param(
        &mut self,
        path: &str,
        value: impl Into<Value>,
        source: &str,
    ) -> Result<(), RegistryError> {
        self.write(ParamWrite::new(path, value, source))
    }

    /// Write an `ESTABLISHED` ground-truth value.
    pub fn establish(
        &mut self,
        path: &str,
        value: impl Into<Value>,
        source: &str,
    ) -> Result<(), RegistryError> {
        self.write(ParamWrite::new(path, value, source).status(Status::Established))
    }

    /// Insert or replace an entry and append a provenance record.
    ///
    /// Fails with [`RegistryError::ImmutableParameter`] if the path is already
    /// `ESTABLISHED`, whatever the new value or status.
    pub fn write(&mut self, write: ParamWrite) -> Result<(), RegistryError> {
        check_write(&write)?;

        if let Some(existing) = self.entries.get(&write.path)
            && existing.status == Status::Established
        {
            return Err(RegistryError::ImmutableParameter {
                path: write.path,
                source_tag: existing.source.clone(),
            });
        }

        let seq = self.history.len() as u64 + 1;
        self.history.push(ProvenanceRecord {
            seq,
            path: write.path.clone(),
            value: write.value.clone(),
            source: write.source.clone(),
            status: write.status,
            uncertainty: write.uncertainty,
            written_by: write.written_by.clone(),
            recorded_at: Utc::now(),
        });
        debug!(path = %write.path, status = %write.status, seq, "parameter written");

        self.entries.insert(
            write.path.clone(),
            ParameterEntry {
                path: write.path,
                value: write.value,
                source: write.source,
                status: write.status,
                uncertainty: write.uncertainty,
                metadata: write.metadata,
                written_by: write.written_by,
                revision: seq,
            },
        );
        Ok(())
    }

    /// The append-only provenance log, oldest first.
    pub fn history(&self) -> &[ProvenanceRecord] {
        &self.history
    }

    /// Provenance records for one path, oldest first.
    pub fn history_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ProvenanceRecord> {
        self.history.iter().filter(move |record| record.path == path)
    }

    /// Current entries sorted by path.
    pub fn entries(&self) -> impl Iterator<Item = &ParameterEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep copy for callers that need all-or-nothing semantics.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// SHA-256 (hex) over `(path, value bits)` of entries whose status is in `statuses`.
    ///
    /// Two registries with equal fingerprints hold bit-identical values on those paths.
    pub fn fingerprint(&self, statuses: &[Status]) -> String {
        let mut hasher = Sha256::new();
        for entry in self.entries.values() {
            if !statuses.contains(&entry.status) {
                continue;
            }
            hasher.update((entry.path.len() as u64).to_be_bytes());
            hasher.update(entry.path.as_bytes());
            hasher.update(entry.value.canonical_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Process-wide registry, constructed lazily on first use.
///
/// Prefer an explicit [`ParameterRegistry`] threaded through the engine; this
/// accessor is for callers that need a single ambient instance.
pub fn default_registry() -> &'static Mutex<ParameterRegistry> {
    static DEFAULT: OnceLock<Mutex<ParameterRegistry>> = OnceLock::new();
    DEFAULT.get_or_init(|| Mutex::new(ParameterRegistry::new()))
}

fn check_write(write: &ParamWrite) -> Result<(), RegistryError> {
    if !is_valid_path(&write.path) || is_private(&write.path) {
        return Err(RegistryError::InvalidPath(write.path.clone()));
    }
    write
        .value
        .check()
        .map_err(|message| RegistryError::InvalidValue {
            path: write.path.clone(),
            message,
        })?;
    if write.source.trim().is_empty() {
        return Err(RegistryError::InvalidValue {
            path: write.path.clone(),
            message: "source must not be blank".to_string(),
        });
    }
    if let Some(uncertainty) = write.uncertainty
        && !(uncertainty.is_finite() && uncertainty >= 0.0)
    {
        return Err(RegistryError::InvalidValue {
            path: write.path.clone(),
            message: format!("uncertainty must be finite and >= 0 (got {uncertainty})"),
        });
    }
    let errors = write.metadata.validate();
    if !errors.is_empty() {
        return Err(RegistryError::InvalidMetadata {
            path: write.path.clone(),
            message: errors.join("; "),
        });
    }
    Ok(())
}

fn type_mismatch(path: &str, expected: &'static str, actual: &Value) -> RegistryError {
    RegistryError::TypeMismatch {
        path: path.to_string(),
        expected,
        actual: actual.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_param_missing_path_errors() {
        let registry = ParameterRegistry::new();
        assert_eq!(
            registry.get_param("topology.b3"),
            Err(RegistryError::MissingParameter("topology.b3".to_string()))
        );
        assert!(!registry.has_param("topology.b3"));
    }

    /// An ESTABLISHED value rejects every later write and keeps its first value.
    #[test]
    fn established_values_are_write_once() {
        let mut registry = ParameterRegistry::new();
        registry
            .establish("constants.M_PLANCK", 1.0, "CODATA")
            .expect("establish");

        let err = registry
            .establish("constants.M_PLANCK", 2.0, "other")
            .expect_err("second establish must fail");
        assert!(matches!(err, RegistryError::ImmutableParameter { .. }));

        let err = registry
            .set_param("constants.M_PLANCK", 3.0, "unit")
            .expect_err("derived overwrite must fail");
        assert!(matches!(err, RegistryError::ImmutableParameter { .. }));

        assert_eq!(registry.get_number("constants.M_PLANCK"), Ok(1.0));
        assert_eq!(registry.history().len(), 1);
    }

    /// Non-established values are replaced, but every write stays in history.
    #[test]
    fn replacement_keeps_full_history() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("thermal.alpha_T", 2.5, "first").expect("first");
        registry
            .write(
                ParamWrite::new("thermal.alpha_T", 2.7, "second")
                    .status(Status::Predicted)
                    .written_by("thermal"),
            )
            .expect("second");

        let entry = registry.entry("thermal.alpha_T").expect("entry");
        assert_eq!(entry.value, Value::Number(2.7));
        assert_eq!(entry.status, Status::Predicted);
        assert_eq!(entry.revision, 2);

        let sources: Vec<&str> = registry
            .history_for("thermal.alpha_T")
            .map(|record| record.source.as_str())
            .collect();
        assert_eq!(sources, vec!["first", "second"]);
        assert_eq!(registry.history()[1].written_by.as_deref(), Some("thermal"));
    }

    #[test]
    fn write_validation_rejects_bad_input() {
        let mut registry = ParameterRegistry::new();
        assert!(matches!(
            registry.set_param("bad..path", 1.0, "x"),
            Err(RegistryError::InvalidPath(_))
        ));
        assert!(matches!(
            registry.set_param("_private.value", 1.0, "x"),
            Err(RegistryError::InvalidPath(_))
        ));
        assert!(matches!(
            registry.set_param("a.b", f64::NAN, "x"),
            Err(RegistryError::InvalidValue { .. })
        ));
        assert!(matches!(
            registry.set_param("a.b", 1.0, "  "),
            Err(RegistryError::InvalidValue { .. })
        ));
        assert!(matches!(
            registry.write(ParamWrite::new("a.b", 1.0, "x").uncertainty(-0.1)),
            Err(RegistryError::InvalidValue { .. })
        ));
        assert!(matches!(
            registry.write(ParamWrite::new("a.b", 1.0, "x").metadata(ParamMetadata {
                bound_source: Some("PDG".to_string()),
                ..ParamMetadata::default()
            })),
            Err(RegistryError::InvalidMetadata { .. })
        ));
        assert!(registry.is_empty());
        assert!(registry.history().is_empty());
    }

    #[test]
    fn typed_accessors_report_mismatch() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("g2.holonomy", "G2", "geometry").expect("label");
        registry.set_param("mass.window", (1.0, 2.0), "bounds").expect("pair");

        assert_eq!(registry.get_label("g2.holonomy"), Ok("G2"));
        assert_eq!(registry.get_pair("mass.window"), Ok((1.0, 2.0)));
        assert_eq!(
            registry.get_number("g2.holonomy"),
            Err(RegistryError::TypeMismatch {
                path: "g2.holonomy".to_string(),
                expected: "number",
                actual: "label",
            })
        );
    }

    #[test]
    fn fingerprint_tracks_selected_statuses_only() {
        let mut a = ParameterRegistry::new();
        let mut b = ParameterRegistry::new();
        a.establish("topology.b3", 24.0, "bootstrap").expect("a");
        b.establish("topology.b3", 25.0, "bootstrap").expect("b");
        a.set_param("thermal.alpha_T", 2.7, "unit").expect("a derived");
        b.set_param("thermal.alpha_T", 2.7, "unit").expect("b derived");

        assert_eq!(
            a.fingerprint(&[Status::Derived]),
            b.fingerprint(&[Status::Derived])
        );
        assert_ne!(
            a.fingerprint(&[Status::Established]),
            b.fingerprint(&[Status::Established])
        );
    }

    #[test]
    fn snapshots_and_new_instances_are_isolated() {
        let mut registry = ParameterRegistry::new();
        registry.set_param("a.b", 1.0, "x").expect("write");
        let snapshot = registry.snapshot();
        registry.set_param("a.b", 2.0, "y").expect("rewrite");

        assert_eq!(snapshot.get_number("a.b"), Ok(1.0));
        assert_eq!(registry.get_number("a.b"), Ok(2.0));
        assert!(ParameterRegistry::new().is_empty());
    }

    #[test]
    fn default_registry_is_shared_and_separate_from_new_instances() {
        {
            let mut shared = default_registry().lock().expect("lock");
            shared
                .set_param("singleton.check", 1.0, "test")
                .expect("write shared");
        }
        let again = default_registry().lock().expect("lock");
        assert!(again.has_param("singleton.check"));
        assert!(!ParameterRegistry::new().has_param("singleton.check"));
    }
}
