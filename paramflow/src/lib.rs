//! Provenance-tracked parameter registry and dependency-driven execution engine.
//!
//! Independently authored computation units declare the registry paths they
//! read and produce. The engine orders them by those declarations, runs
//! them, and records every write with its provenance. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (registry, unit contract,
//!   resolution, certificates). No filesystem access, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting operations (config, bootstrap files, reports,
//!   gate ledger).
//!
//! Orchestration modules ([`execute`], [`orchestrator`], [`audit`]) coordinate
//! core logic into runs; [`catalog`] holds the demo units used by the CLI.

pub mod audit;
pub mod catalog;
pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
