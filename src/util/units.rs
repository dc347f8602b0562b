//! Units formatting utilities
//!
//! Human-readable rendering of durations, latencies and request throughput
//! for the benchmark report.

use std::time::Duration;

/// Format a wall-clock duration into a compact human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use benchmesh::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else if millis > 0 {
        format!("{}ms", millis)
    } else {
        format_latency(duration)
    }
}

/// Format a latency with precision suited to its magnitude
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use benchmesh::util::units::format_latency;
///
/// assert_eq!(format_latency(Duration::from_millis(15)), "15.00ms");
/// assert_eq!(format_latency(Duration::from_micros(500)), "500μs");
/// ```
pub fn format_latency(duration: Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos >= 1_000_000_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if nanos >= 1_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else if nanos >= 1_000 {
        format!("{}μs", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

/// Calculate requests per second from a request count and duration
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use benchmesh::util::units::calculate_throughput;
///
/// assert_eq!(calculate_throughput(200, Duration::from_secs(2)), 100.0);
/// ```
pub fn calculate_throughput(requests: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }
    requests as f64 / duration.as_secs_f64()
}

/// Format a request rate
pub fn format_throughput(per_second: f64) -> String {
    format!("{:.6}/sec", per_second)
}
