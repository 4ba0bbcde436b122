//! Typed error taxonomy for the registry, units, and the engine.

use thiserror::Error;

/// Registry read/write failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{path}' is ESTABLISHED and cannot be overwritten (source: {source_tag})")]
    ImmutableParameter { path: String, source_tag: String },

    #[error("invalid parameter path '{0}'")]
    InvalidPath(String),

    #[error("invalid value for '{path}': {message}")]
    InvalidValue { path: String, message: String },

    #[error("invalid metadata for '{path}': {message}")]
    InvalidMetadata { path: String, message: String },

    #[error("parameter '{path}' is a {actual}, expected a {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Failures raised while executing a single unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("required input '{0}' is absent")]
    MissingInput(String),

    #[error("read of undeclared input '{0}'")]
    UndeclaredInput(String),

    #[error("result contains undeclared output '{0}'")]
    UndeclaredOutput(String),

    #[error("result is missing declared output '{0}'")]
    MissingOutput(String),

    #[error("inputs unavailable after upstream failure: {}", .0.join(", "))]
    UnresolvableDependency(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("unit panicked: {0}")]
    Panicked(String),
}

/// Structural and orchestration failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid unit '{unit_id}': {}", .errors.join("; "))]
    InvalidUnit { unit_id: String, errors: Vec<String> },

    #[error("unit id '{0}' is already registered")]
    DuplicateUnit(String),

    #[error("path '{path}' has multiple producers: {}", .units.join(", "))]
    DuplicateProducer { path: String, units: Vec<String> },

    #[error("unit '{unit_id}' declares output '{path}' which is already ESTABLISHED")]
    EstablishedOutput { unit_id: String, path: String },

    #[error("unit '{unit_id}' requires unresolvable inputs: {}", .paths.join(", "))]
    UnresolvableDependency { unit_id: String, paths: Vec<String> },

    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("unit '{unit_id}' failed: {source}")]
    UnitExecution { unit_id: String, source: UnitError },
}

impl EngineError {
    /// True for errors detected before any unit executes.
    pub fn is_structural(&self) -> bool {
        !matches!(self, EngineError::UnitExecution { .. })
    }
}
