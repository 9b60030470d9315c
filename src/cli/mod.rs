/// CLI utilities for the `codecortex` binary
///
/// Modules:
/// - output: result formatting (text, JSON, NDJSON)
/// - progress: progress reporting for long-running indexing runs
pub mod output;
pub mod progress;

pub use output::{OutputFormat, OutputWriter};
pub use progress::{ProgressEvent, ProgressReporter};
