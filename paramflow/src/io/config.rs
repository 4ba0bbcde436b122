//! Engine configuration stored in `paramflow.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{ErrorMode, OrchestratorConfig, Strategy};

/// Engine configuration (TOML).
///
/// Edited by humans. Missing fields take the defaults below; CLI flags
/// override whatever the file says.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub error_mode: ErrorMode,
    pub strategy: Strategy,
    /// Log every written value.
    pub verbose: bool,
    /// Write the JSON run report here after `paramflow run`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// Append gate check outcomes to this JSON-lines ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_log_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("report_path", &self.report_path),
            ("gate_log_path", &self.gate_log_path),
        ] {
            if let Some(path) = path
                && path.as_os_str().is_empty()
            {
                return Err(anyhow!("{name} must not be empty when set"));
            }
        }
        if let (Some(report), Some(gates)) = (&self.report_path, &self.gate_log_path)
            && report == gates
        {
            return Err(anyhow!("report_path and gate_log_path must differ"));
        }
        Ok(())
    }

    pub fn orchestrator_config(&self, run_id: Option<String>) -> OrchestratorConfig {
        OrchestratorConfig {
            error_mode: self.error_mode,
            strategy: self.strategy,
            verbose: self.verbose,
            run_id,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.error_mode, ErrorMode::Abort);
        assert_eq!(cfg.strategy, Strategy::Sequential);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("paramflow.toml");
        let cfg = EngineConfig {
            error_mode: ErrorMode::Continue,
            strategy: Strategy::Wavefront,
            verbose: true,
            report_path: Some(PathBuf::from("out/report.json")),
            gate_log_path: Some(PathBuf::from("out/gates.jsonl")),
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("paramflow.toml");
        fs::write(&path, "error_mode = \"continue\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.error_mode, ErrorMode::Continue);
        assert_eq!(cfg.strategy, Strategy::Sequential);
        assert!(cfg.report_path.is_none());
    }

    #[test]
    fn rejects_unknown_modes_and_shared_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("paramflow.toml");
        fs::write(&path, "strategy = \"random\"\n").expect("write");
        assert!(load_config(&path).is_err());

        fs::write(
            &path,
            "report_path = \"same.json\"\ngate_log_path = \"same.json\"\n",
        )
        .expect("write");
        let err = load_config(&path).expect_err("shared path");
        assert!(err.to_string().contains("must differ"));
    }
}
