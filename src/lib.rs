//! benchmesh - distributed benchmark coordination
//!
//! Provisions a pool of remote benchmark workers for each suite, drives the
//! workers through the setup/run phase protocol over RPC and aggregates their
//! per-worker statistics into a single report.

use std::time::Duration;
use thiserror::Error;

pub mod bench;
pub mod config;
pub mod console;
pub mod job;
pub mod models;
pub mod registry;
pub mod rpc;
pub mod util;

/// Errors raised by the coordination engine.
///
/// Variants carry owned text rather than source errors so a single failure
/// can be handed to every caller that joins on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BenchError {
    /// Invalid or unreadable run configuration
    #[error("configuration error: {0}")]
    Config(String),
    /// A worker endpoint is not accepting calls yet; retried by the RPC layer
    #[error("worker {address} unavailable: {message}")]
    Unavailable { address: String, message: String },
    /// A worker could not be reached, after retries where applicable
    #[error("connectivity error: {0}")]
    Connectivity(String),
    /// A setup/run call returned a failure
    #[error("{phase} failed: {message}")]
    Phase { phase: String, message: String },
    /// Every call succeeded but the aggregated mean latency is too high
    #[error("mean latency of {}ms for benchmark {benchmark} meets or exceeds the maximum of {}ms", .mean.as_millis(), .max.as_millis())]
    ThresholdViolation {
        benchmark: String,
        mean: Duration,
        max: Duration,
    },
    /// The job runner failed to create the worker pool
    #[error("provisioning error: {0}")]
    Provisioning(String),
    /// Unknown or duplicate suite
    #[error("registry error: {0}")]
    Registry(String),
    /// A background task vanished without reporting a result
    #[error("task join error: {0}")]
    Join(String),
    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl BenchError {
    /// Build a phase error for the named phase.
    pub fn phase(phase: impl Into<String>, message: impl Into<String>) -> Self {
        BenchError::Phase {
            phase: phase.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Config(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        BenchError::Config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for BenchError {
    fn from(err: toml::ser::Error) -> Self {
        BenchError::Config(format!("TOML serialization error: {}", err))
    }
}

impl From<tokio::task::JoinError> for BenchError {
    fn from(err: tokio::task::JoinError) -> Self {
        BenchError::Join(err.to_string())
    }
}

/// Result type alias for benchmesh operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Error handling utilities
pub mod error {
    use super::{BenchError, Result};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Retry policy for transient worker unavailability
    #[derive(Debug, Clone, PartialEq)]
    pub struct RetryPolicy {
        /// Maximum number of attempts, including the first call
        pub max_attempts: usize,
        /// Delay before the first retry
        pub initial_delay: Duration,
        /// Multiplier applied to the delay after every retry
        pub backoff_multiplier: f64,
        /// Upper bound on a single delay, if any
        pub max_delay: Option<Duration>,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            Self {
                max_attempts: 10,
                initial_delay: Duration::from_secs(1),
                backoff_multiplier: 2.0,
                max_delay: None,
            }
        }
    }

    impl RetryPolicy {
        /// Delay to sleep before retry number `retry` (1-based).
        pub fn delay_for(&self, retry: usize) -> Duration {
            if retry == 0 {
                return Duration::ZERO;
            }
            let factor = self.backoff_multiplier.powi(retry as i32 - 1);
            let delay = self.initial_delay.mul_f64(factor);
            match self.max_delay {
                Some(max) => delay.min(max),
                None => delay,
            }
        }
    }

    /// Retry a fallible async operation while it reports the worker as unavailable.
    ///
    /// Any other error is returned on the spot. When the attempts run out the
    /// last unavailability is surfaced as a [`BenchError::Connectivity`].
    pub async fn retry_async<F, Fut, T>(operation: F, policy: &RetryPolicy) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying unavailable worker"
                );
                sleep(backoff).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable_error(&err) => {
                    tracing::warn!(attempt, error = %err, "worker call failed, will retry");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(match last_error {
            Some(BenchError::Unavailable { address, message }) => BenchError::Connectivity(
                format!("{} unreachable after {} attempts: {}", address, attempts, message),
            ),
            Some(other) => other,
            None => BenchError::Connectivity("retry failed with no error".to_string()),
        })
    }

    /// Check if an error is retryable
    pub fn is_retryable_error(error: &BenchError) -> bool {
        matches!(error, BenchError::Unavailable { .. })
    }

    /// Convert error to a user-facing message
    pub fn user_friendly_message(error: &BenchError) -> String {
        match error {
            BenchError::Connectivity(msg) => format!(
                "Could not reach a benchmark worker ({}). Check that the worker pool is running.",
                msg
            ),
            BenchError::ThresholdViolation { .. } => {
                format!("Latency threshold violated: {}", error)
            }
            BenchError::Provisioning(msg) => {
                format!("Failed to provision the worker pool: {}", msg)
            }
            BenchError::Config(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "benchmesh";
pub const CONFIG_FILE: &str = "benchmesh.toml";
pub const DEFAULT_WORKER_PORT: u16 = 5000;
pub const DEFAULT_CLUSTER_DOMAIN: &str = "svc.cluster.local";
