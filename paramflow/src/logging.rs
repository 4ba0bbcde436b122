//! Development-time tracing.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of the run's product output.
//!
//! - **Run reports (`io/report_store`)** and the **gate ledger
//!   (`io/gate_log`)**: product artifacts, always written when configured,
//!   unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, or `paramflow=info` when
/// `verbose` is set and `RUST_LOG` is absent.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=paramflow=debug paramflow run --bootstrap bootstrap.json
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "paramflow=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
