//! Tabular suite report
//!
//! Renders the aggregated results of a suite as column-aligned text, one row
//! per benchmark.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::result::BenchmarkResult;
use crate::util::units::{format_duration, format_latency, format_throughput};
use crate::{BenchError, Result};

const HEADERS: [&str; 9] = [
    "BENCHMARK",
    "REQUESTS",
    "DURATION",
    "THROUGHPUT",
    "MEAN LATENCY",
    "MEDIAN LATENCY",
    "75% LATENCY",
    "95% LATENCY",
    "99% LATENCY",
];

const PADDING: usize = 3;

/// Results of every benchmark run for one suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub results: Vec<BenchmarkResult>,
}

impl SuiteReport {
    pub fn new(suite: impl Into<String>, results: Vec<BenchmarkResult>) -> Self {
        Self {
            suite: suite.into(),
            results,
        }
    }

    /// Fail with a threshold violation for the first benchmark whose mean
    /// latency meets or exceeds `max`.
    pub fn check_max_latency(&self, max: Option<Duration>) -> Result<()> {
        let Some(max) = max else {
            return Ok(());
        };
        match self.results.iter().find(|r| r.exceeds(max)) {
            Some(result) => Err(BenchError::ThresholdViolation {
                benchmark: result.benchmark.clone(),
                mean: result.latency.mean,
                max,
            }),
            None => Ok(()),
        }
    }

    fn rows(&self) -> Vec<[String; 9]> {
        let mut rows = vec![HEADERS.map(String::from)];
        for r in &self.results {
            rows.push([
                r.benchmark.clone(),
                r.requests.to_string(),
                format_duration(r.duration),
                format_throughput(r.throughput),
                format_latency(r.latency.mean),
                format_latency(r.latency.p50),
                format_latency(r.latency.p75),
                format_latency(r.latency.p95),
                format_latency(r.latency.p99),
            ]);
        }
        rows
    }

    /// Render the column-aligned table
    pub fn render(&self) -> String {
        let rows = self.rows();
        let mut widths = [0usize; 9];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for row in &rows {
            let mut line = String::new();
            for (i, cell) in row.iter().enumerate() {
                line.push_str(cell);
                if i + 1 < row.len() {
                    let pad = widths[i] - cell.chars().count() + PADDING;
                    line.extend(std::iter::repeat(' ').take(pad));
                }
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::result::{aggregate, LatencyStats, PhaseResult};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn report() -> SuiteReport {
        let get = aggregate(
            "Get",
            &[
                PhaseResult::new(100, ms(1000), LatencyStats::new(ms(10), ms(8), ms(12), ms(20), ms(25))),
                PhaseResult::new(100, ms(2000), LatencyStats::new(ms(20), ms(16), ms(24), ms(30), ms(35))),
            ],
        );
        let put = aggregate(
            "PutIfAbsent",
            &[PhaseResult::new(5, ms(500), LatencyStats::new(ms(1), ms(1), ms(1), ms(2), ms(3)))],
        );
        SuiteReport::new("map", vec![get, put])
    }

    #[test]
    fn test_render_aligns_columns() {
        let text = report().render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("BENCHMARK     REQUESTS"));
        assert!(lines[1].starts_with("Get           200"));
        assert!(lines[2].starts_with("PutIfAbsent   5"));

        let column = lines[0].find("DURATION").unwrap();
        assert_eq!(&lines[1][column..column + 2], "2s");
        assert!(lines[1].contains("100.000000/sec"));
        assert!(lines[1].contains("15.00ms"));
    }

    #[test]
    fn test_threshold_check() {
        let report = report();
        assert!(report.check_max_latency(None).is_ok());
        assert!(report.check_max_latency(Some(ms(16))).is_ok());

        match report.check_max_latency(Some(ms(10))) {
            Err(BenchError::ThresholdViolation { benchmark, mean, max }) => {
                assert_eq!(benchmark, "Get");
                assert_eq!(mean, ms(15));
                assert_eq!(max, ms(10));
            }
            other => panic!("expected threshold violation, got {:?}", other),
        }
    }
}
