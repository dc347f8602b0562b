//! Worker RPC surface
//!
//! The coordinator only depends on the [`WorkerService`] capability; the
//! transport behind it is supplied by a [`Connector`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::PhaseResult;
use crate::util::duration_serde;
use crate::Result;

pub mod client;

pub use client::{HttpConnector, HttpWorkerClient};

/// Phase names as they appear on the wire and in errors
pub mod phase {
    pub const SETUP_SUITE: &str = "setup-suite";
    pub const SETUP_WORKER: &str = "setup-worker";
    pub const SETUP_BENCHMARK: &str = "setup-benchmark";
    pub const RUN_BENCHMARK: &str = "run-benchmark";
}

/// Payload of `SetupSuite` and `SetupWorker`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRequest {
    pub suite: String,
    pub args: BTreeMap<String, String>,
}

/// Payload of `SetupBenchmark`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub suite: String,
    pub benchmark: String,
    pub args: BTreeMap<String, String>,
}

/// Payload of `RunBenchmark`; `requests` and `duration` are mutually exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub suite: String,
    pub benchmark: String,
    pub requests: u64,
    #[serde(with = "duration_serde::option_nanos", default)]
    pub duration: Option<Duration>,
    #[serde(with = "duration_serde::option_nanos", default)]
    pub max_latency: Option<Duration>,
    pub parallelism: u32,
    pub args: BTreeMap<String, String>,
}

/// The four calls every benchmark worker answers
#[async_trait]
pub trait WorkerService: Send + Sync {
    /// Prepare suite-wide state; called on one worker only
    async fn setup_suite(&self, request: SuiteRequest) -> Result<()>;

    /// Prepare worker-local state; called on every worker
    async fn setup_worker(&self, request: SuiteRequest) -> Result<()>;

    /// Prepare one benchmark; called on every worker before it runs
    async fn setup_benchmark(&self, request: BenchmarkRequest) -> Result<()>;

    /// Run one benchmark and report local measurements
    async fn run_benchmark(&self, request: RunRequest) -> Result<PhaseResult>;
}

/// Opens a [`WorkerService`] handle for a worker address
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn WorkerService>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_wire_shape() {
        let request = RunRequest {
            suite: "map".to_string(),
            benchmark: "Get".to_string(),
            requests: 0,
            duration: Some(Duration::from_secs(2)),
            max_latency: None,
            parallelism: 4,
            args: BTreeMap::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["duration"], 2_000_000_000u64);
        assert!(json["max_latency"].is_null());
        assert_eq!(json["parallelism"], 4);

        let parsed: RunRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, request);
    }
}
