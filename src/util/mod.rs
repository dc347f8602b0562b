//! Utility functions module
//!
//! Contains helpers for units formatting and duration (de)serialization.

pub mod duration_serde;
pub mod units;

// Re-export commonly used functions
pub use units::{calculate_throughput, format_duration, format_latency, format_throughput};
