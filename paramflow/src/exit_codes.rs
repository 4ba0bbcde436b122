//! Stable exit codes for paramflow CLI commands.

/// Command succeeded and every finding passed.
pub const OK: i32 = 0;
/// Invalid config, bootstrap, or unit set, or a pre-flight failure.
pub const INVALID: i32 = 1;
/// A unit failed during execution.
pub const UNIT_FAILED: i32 = 2;
/// The run completed but a certificate, self-validation, or gate check failed.
pub const FINDINGS_FAILED: i32 = 3;
