//! Parameter registry and dependency-driven execution engine.
//!
//! Seeds a provenance-tracked registry from a bootstrap file, orders the
//! demo catalog's units by their declared inputs and outputs, runs them, and
//! reports certificates and gate checks.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use paramflow::audit::RunReport;
use paramflow::catalog::register_demo_units;
use paramflow::core::gate::GateLedger;
use paramflow::core::registry::ParameterRegistry;
use paramflow::exit_codes;
use paramflow::io::bootstrap::{apply_bootstrap, default_bootstrap, load_bootstrap};
use paramflow::io::config::{EngineConfig, load_config};
use paramflow::io::gate_log::{append_gate_entries, load_gate_log};
use paramflow::io::report_store::{write_audit_records, write_report};
use paramflow::logging;
use paramflow::orchestrator::{ErrorMode, Orchestrator, Strategy};

#[derive(Parser)]
#[command(
    name = "paramflow",
    version,
    about = "Provenance-tracked parameter registry and dependency-driven unit runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Bootstrap JSON with ESTABLISHED inputs. Defaults to the reference topology.
    #[arg(long)]
    bootstrap: Option<PathBuf>,
    /// Engine config (TOML). A missing file means defaults.
    #[arg(long, default_value = "paramflow.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Load config and bootstrap, register units, and run pre-flight checks.
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Print the execution order without running anything.
    Plan {
        #[command(flatten)]
        common: CommonArgs,
        /// Print Kahn levels instead of the flat order.
        #[arg(long)]
        wavefronts: bool,
    },
    /// Execute every unit and print the run summary as JSON.
    Run {
        #[command(flatten)]
        common: CommonArgs,
        /// Record failures and skip their dependents instead of aborting.
        #[arg(long)]
        continue_on_error: bool,
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
        /// Write the full JSON report here.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Append gate outcomes to this JSON-lines ledger.
        #[arg(long)]
        gate_log: Option<PathBuf>,
        /// Write flat certificate and gate records as a JSON array.
        #[arg(long)]
        audit: Option<PathBuf>,
        #[arg(long)]
        run_id: Option<String>,
        /// Log every written value.
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Command::Run { verbose: true, .. });
    logging::init(verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Check { common } => cmd_check(&common),
        Command::Plan { common, wavefronts } => cmd_plan(&common, wavefronts),
        Command::Run {
            common,
            continue_on_error,
            strategy,
            report,
            gate_log,
            audit,
            run_id,
            verbose,
        } => {
            let mut cfg = load_config(&common.config)?;
            if continue_on_error {
                cfg.error_mode = ErrorMode::Continue;
            }
            if let Some(strategy) = strategy {
                cfg.strategy = strategy;
            }
            if report.is_some() {
                cfg.report_path = report;
            }
            if gate_log.is_some() {
                cfg.gate_log_path = gate_log;
            }
            cfg.verbose |= verbose;
            cfg.validate()?;
            cmd_run(&common, &cfg, run_id, audit)
        }
    }
}

/// Load the bootstrap and register the demo units.
fn prepare(
    common: &CommonArgs,
    cfg: &EngineConfig,
    run_id: Option<String>,
) -> Result<(ParameterRegistry, Orchestrator)> {
    let bootstrap = match &common.bootstrap {
        Some(path) => load_bootstrap(path)?,
        None => default_bootstrap(),
    };
    let mut registry = ParameterRegistry::new();
    apply_bootstrap(&mut registry, &bootstrap)?;

    let mut orchestrator = Orchestrator::new(cfg.orchestrator_config(run_id));
    register_demo_units(&mut orchestrator).context("register units")?;
    Ok((registry, orchestrator))
}

fn cmd_check(common: &CommonArgs) -> Result<i32> {
    let cfg = load_config(&common.config)?;
    let (registry, orchestrator) = prepare(common, &cfg, None)?;
    let plan = orchestrator.plan(&registry).context("pre-flight")?;
    println!(
        "ok: {} units, {} parameters, {} levels",
        plan.order.len(),
        registry.len(),
        plan.levels.len()
    );
    for unit in orchestrator.units() {
        let descriptor = unit.descriptor();
        let formulas: Vec<&str> = unit.formulas().iter().map(|f| f.id.as_str()).collect();
        let section = unit.section().map_or("-", |section| section.section_id.as_str());
        println!(
            "  {} {} inputs={} outputs={} formulas=[{}] section={}",
            descriptor.id,
            descriptor.version,
            descriptor.required_inputs.len(),
            descriptor.output_params.len(),
            formulas.join(","),
            section
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(common: &CommonArgs, wavefronts: bool) -> Result<i32> {
    let cfg = load_config(&common.config)?;
    let (registry, orchestrator) = prepare(common, &cfg, None)?;
    let plan = orchestrator.plan(&registry).context("pre-flight")?;
    if wavefronts {
        for (idx, level) in plan.levels.iter().enumerate() {
            println!("{}: {}", idx + 1, level.join(" "));
        }
    } else {
        for id in &plan.order {
            println!("{id}");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    common: &CommonArgs,
    cfg: &EngineConfig,
    run_id: Option<String>,
    audit: Option<PathBuf>,
) -> Result<i32> {
    let (mut registry, orchestrator) = prepare(common, cfg, run_id)?;
    let mut ledger = match &cfg.gate_log_path {
        Some(path) => load_gate_log(path)?,
        None => GateLedger::new(),
    };
    let offset = ledger.len();

    let outcome = orchestrator.run(&mut registry, &mut ledger);
    if let Some(path) = &cfg.gate_log_path {
        append_gate_entries(path, ledger.since(offset))?;
    }

    let report = match outcome {
        Ok(report) => report,
        Err(err) if err.is_structural() => return Err(anyhow!(err).context("pre-flight")),
        Err(err) => {
            eprintln!("{err}");
            return Ok(exit_codes::UNIT_FAILED);
        }
    };

    if let Some(path) = &cfg.report_path {
        write_report(path, &report)?;
    }
    if let Some(path) = &audit {
        write_audit_records(path, &report.audit_records())?;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&report.summary).context("serialize summary")?
    );
    Ok(exit_code_for(&report))
}

fn exit_code_for(report: &RunReport) -> i32 {
    for (unit_id, state, error) in report.failures() {
        eprintln!("{unit_id} ({state:?}): {error}");
    }
    if report.summary.units_failed > 0 || report.summary.units_skipped > 0 {
        exit_codes::UNIT_FAILED
    } else if report.has_failed_findings() {
        exit_codes::FINDINGS_FAILED
    } else {
        exit_codes::OK
    }
}
