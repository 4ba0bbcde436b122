//! Bootstrap loader: seeds the registry with `ESTABLISHED` values.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::registry::{ParamWrite, ParameterRegistry};
use crate::core::value::{ParamMetadata, Status, Value};

const BOOTSTRAP_SCHEMA: &str = include_str!("../../schemas/bootstrap.schema.json");

/// Contents of a bootstrap JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapFile {
    pub parameters: Vec<BootstrapParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapParameter {
    pub path: String,
    pub value: Value,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl BootstrapParameter {
    fn to_write(&self) -> ParamWrite {
        let metadata = ParamMetadata {
            description: self.description.clone(),
            units: self.units.clone(),
            ..ParamMetadata::default()
        };
        let mut write = ParamWrite::new(&self.path, self.value.clone(), &self.source)
            .status(Status::Established)
            .metadata(metadata);
        if let Some(uncertainty) = self.uncertainty {
            write = write.uncertainty(uncertainty);
        }
        write
    }
}

/// Reference inputs for the demo catalog, used when no file is given.
pub fn default_bootstrap() -> BootstrapFile {
    BootstrapFile {
        parameters: vec![BootstrapParameter {
            path: "topology.b3".to_string(),
            value: Value::Number(24.0),
            source: "reference topology".to_string(),
            uncertainty: None,
            description: Some("third Betti number".to_string()),
            units: None,
        }],
    }
}

/// Read, schema-check, and deserialize a bootstrap file.
pub fn load_bootstrap(path: &Path) -> Result<BootstrapFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read bootstrap {}", path.display()))?;
    let raw: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse bootstrap {}", path.display()))?;
    validate_schema(&raw).with_context(|| format!("validate bootstrap {}", path.display()))?;
    let file: BootstrapFile = serde_json::from_value(raw)
        .with_context(|| format!("deserialize bootstrap {}", path.display()))?;
    debug!(path = %path.display(), parameters = file.parameters.len(), "bootstrap loaded");
    Ok(file)
}

/// Establish every bootstrap parameter. Stops at the first rejected write.
pub fn apply_bootstrap(registry: &mut ParameterRegistry, file: &BootstrapFile) -> Result<usize> {
    for parameter in &file.parameters {
        registry
            .write(parameter.to_write())
            .with_context(|| format!("establish '{}'", parameter.path))?;
    }
    info!(parameters = file.parameters.len(), "registry bootstrapped");
    Ok(file.parameters.len())
}

fn validate_schema(raw: &serde_json::Value) -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(BOOTSTRAP_SCHEMA).context("parse embedded bootstrap schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(raw) {
        let messages = compiled
            .iter_errors(raw)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "bootstrap schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
