//! Data models module
//!
//! Contains per-worker phase results, aggregated benchmark results and the
//! suite report.

pub mod report;
pub mod result;

// Re-export commonly used types
pub use report::SuiteReport;
pub use result::{aggregate, BenchmarkResult, LatencyStats, PhaseResult};
