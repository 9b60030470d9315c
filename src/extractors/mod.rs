//! `SymbolSource` implementations.
//!
//! The core's authoritative parser lives outside this crate (§1: "the host
//! IDE's source-of-truth AST/PSI walker"); production callers implement
//! [`crate::coordinator::SymbolSource`] themselves and never need this
//! module. `rust` is a single bundled implementation that gives the CLI and
//! test suite a real parser to exercise without wiring one in externally.

pub mod rust;

pub use rust::RustSource;
