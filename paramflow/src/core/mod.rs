//! Deterministic, pure logic shared by the engine.
//!
//! Core modules are free of filesystem I/O. They operate on in-memory data
//! structures and return deterministic outputs suitable for tests.

pub mod certificate;
pub mod error;
pub mod gate;
pub mod invariants;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod unit;
pub mod value;
