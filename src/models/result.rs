//! Benchmark result data models
//!
//! Per-worker phase results as returned by `RunBenchmark`, the suite-level
//! result they aggregate into, and the aggregation itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::duration_serde;
use crate::util::units::calculate_throughput;

/// Mean and percentile latencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Mean latency
    #[serde(rename = "latency", with = "duration_serde::nanos")]
    pub mean: Duration,
    /// 50th percentile
    #[serde(rename = "latency50", with = "duration_serde::nanos")]
    pub p50: Duration,
    /// 75th percentile
    #[serde(rename = "latency75", with = "duration_serde::nanos")]
    pub p75: Duration,
    /// 95th percentile
    #[serde(rename = "latency95", with = "duration_serde::nanos")]
    pub p95: Duration,
    /// 99th percentile
    #[serde(rename = "latency99", with = "duration_serde::nanos")]
    pub p99: Duration,
}

/// One worker's measurements for one benchmark
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Requests completed by the worker
    pub requests: u64,
    /// Wall-clock time the worker spent
    #[serde(with = "duration_serde::nanos")]
    pub duration: Duration,
    /// Latencies as measured locally by the worker
    #[serde(flatten)]
    pub latency: LatencyStats,
}

/// Suite-level result of one benchmark across the whole pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Benchmark name
    pub benchmark: String,
    /// Total requests across workers
    pub requests: u64,
    /// Duration of the slowest worker
    #[serde(with = "duration_serde::nanos")]
    pub duration: Duration,
    /// Requests per second over `duration`
    pub throughput: f64,
    /// Per-worker latencies averaged across workers
    pub latency: LatencyStats,
}

impl PhaseResult {
    pub fn new(requests: u64, duration: Duration, latency: LatencyStats) -> Self {
        Self {
            requests,
            duration,
            latency,
        }
    }
}

impl LatencyStats {
    pub fn new(mean: Duration, p50: Duration, p75: Duration, p95: Duration, p99: Duration) -> Self {
        Self {
            mean,
            p50,
            p75,
            p95,
            p99,
        }
    }
}

/// Combine the per-worker results of one benchmark.
///
/// Requests are summed and the duration is the maximum across workers.
/// Latencies are the arithmetic mean of each worker's own value, including
/// the percentiles: this approximates rather than recomputes a global
/// percentile, since percentiles are not distributive.
pub fn aggregate(benchmark: &str, results: &[PhaseResult]) -> BenchmarkResult {
    let requests: u64 = results.iter().map(|r| r.requests).sum();
    let duration = results
        .iter()
        .map(|r| r.duration)
        .max()
        .unwrap_or(Duration::ZERO);

    let mean_of = |pick: fn(&LatencyStats) -> Duration| -> Duration {
        if results.is_empty() {
            return Duration::ZERO;
        }
        let total: u128 = results.iter().map(|r| pick(&r.latency).as_nanos()).sum();
        Duration::from_nanos((total / results.len() as u128) as u64)
    };

    BenchmarkResult {
        benchmark: benchmark.to_string(),
        requests,
        duration,
        throughput: calculate_throughput(requests, duration),
        latency: LatencyStats {
            mean: mean_of(|l| l.mean),
            p50: mean_of(|l| l.p50),
            p75: mean_of(|l| l.p75),
            p95: mean_of(|l| l.p95),
            p99: mean_of(|l| l.p99),
        },
    }
}

impl BenchmarkResult {
    /// Whether the mean latency reaches `max`
    pub fn exceeds(&self, max: Duration) -> bool {
        self.latency.mean >= max
    }

    /// Get a one-line summary of the result
    pub fn summary(&self) -> String {
        format!(
            "{} - {} requests in {:?} - {:.2}/sec - {:.2}ms mean latency",
            self.benchmark,
            self.requests,
            self.duration,
            self.throughput,
            self.latency.mean.as_secs_f64() * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn worker(requests: u64, secs: u64, l: [u64; 5]) -> PhaseResult {
        PhaseResult::new(
            requests,
            Duration::from_secs(secs),
            LatencyStats::new(ms(l[0]), ms(l[1]), ms(l[2]), ms(l[3]), ms(l[4])),
        )
    }

    #[test]
    fn test_two_worker_aggregation() {
        let results = [
            worker(100, 1, [10, 8, 12, 20, 25]),
            worker(100, 2, [20, 16, 24, 30, 35]),
        ];
        let result = aggregate("Get", &results);

        assert_eq!(result.benchmark, "Get");
        assert_eq!(result.requests, 200);
        assert_eq!(result.duration, Duration::from_secs(2));
        assert_eq!(result.throughput, 100.0);
        assert_eq!(result.latency, LatencyStats::new(ms(15), ms(12), ms(18), ms(25), ms(30)));
    }

    #[test]
    fn test_aggregation_ignores_worker_order() {
        let a = worker(10, 3, [1, 2, 3, 4, 5]);
        let b = worker(7, 1, [9, 9, 9, 9, 9]);
        let c = worker(33, 2, [4, 1, 7, 2, 8]);

        let forward = aggregate("Put", &[a, b, c]);
        for permutation in [[a, c, b], [b, a, c], [b, c, a], [c, a, b], [c, b, a]] {
            assert_eq!(aggregate("Put", &permutation), forward);
        }
    }

    #[test]
    fn test_duration_is_max_not_sum() {
        let results = [
            worker(1, 4, [1, 1, 1, 1, 1]),
            worker(1, 2, [1, 1, 1, 1, 1]),
            worker(1, 3, [1, 1, 1, 1, 1]),
        ];
        let result = aggregate("Get", &results);
        assert_eq!(result.duration, Duration::from_secs(4));
        assert_ne!(result.duration, Duration::from_secs(9));

        let single = aggregate("Get", &results[..1]);
        assert_eq!(single.duration, Duration::from_secs(4));
    }

    #[test]
    fn test_empty_and_zero_duration() {
        let empty = aggregate("Get", &[]);
        assert_eq!(empty.requests, 0);
        assert_eq!(empty.throughput, 0.0);

        let instant = aggregate("Get", &[worker(5, 0, [0, 0, 0, 0, 0])]);
        assert_eq!(instant.throughput, 0.0);
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(worker(100, 1, [10, 8, 12, 20, 25])).unwrap();
        assert_eq!(json["requests"], 100);
        assert_eq!(json["duration"], 1_000_000_000u64);
        assert_eq!(json["latency"], 10_000_000u64);
        assert_eq!(json["latency50"], 8_000_000u64);
        assert_eq!(json["latency99"], 25_000_000u64);
    }

    #[test]
    fn test_threshold() {
        let result = aggregate("Get", &[worker(1, 1, [15, 0, 0, 0, 0])]);
        assert!(result.exceeds(ms(10)));
        assert!(result.exceeds(ms(15)));
        assert!(!result.exceeds(ms(16)));
    }
}
