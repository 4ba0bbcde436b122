//! Parameter path validation.
//!
//! Paths are case-sensitive, dot-delimited hierarchical keys such as
//! `topology.b3` or `constants.M_PLANCK`. They are the only coupling between
//! independently authored units.

use std::sync::LazyLock;

use regex::Regex;

static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("path pattern compiles")
});

/// Prefix marking a private/diagnostic key in a unit result.
pub const PRIVATE_PREFIX: char = '_';

/// True if `path` is a well-formed parameter path.
pub fn is_valid_path(path: &str) -> bool {
    PATH_PATTERN.is_match(path)
}

/// True if `path` uses the private/diagnostic naming convention.
///
/// Private keys are informational only and never persisted.
pub fn is_private(path: &str) -> bool {
    path.starts_with(PRIVATE_PREFIX)
}
