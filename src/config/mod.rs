//! Configuration management module
//!
//! Holds the immutable run configuration handed to the coordinator, its
//! validation, and loading from TOML files.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::util::duration_serde;
use crate::{BenchError, Result, APP_NAME, CONFIG_FILE, DEFAULT_CLUSTER_DOMAIN, DEFAULT_WORKER_PORT};

/// Run configuration: what to run, on how many workers, and how hard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Run identifier; also the namespace prefix for every suite
    pub id: String,
    /// Suites to run; empty means every registered suite
    pub suites: Vec<String>,
    /// Run only this benchmark of each suite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    /// Number of workers in each suite's pool
    pub workers: usize,
    /// Client-side parallelism inside each worker
    pub parallelism: u32,
    /// Total iteration count or fixed wall-clock duration
    pub bounds: RunBounds,
    /// Fail the run when an aggregated mean latency reaches this value
    #[serde(
        with = "duration_serde::option_human",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_latency: Option<Duration>,
    /// Arguments passed through to every worker call
    pub args: BTreeMap<String, String>,
    /// Parameters used only by the job runner
    pub deploy: DeployConfig,
    /// Suites and their benchmarks in declaration order
    pub registry: BTreeMap<String, Vec<String>>,
}

/// How long each benchmark runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunBounds {
    /// Total request count split across the pool
    Iterations(u64),
    /// Every worker runs for this long
    Duration(#[serde(with = "duration_serde::human")] Duration),
}

/// Deployment parameters for the worker jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub image: String,
    pub image_pull_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,
    /// Chart value overrides keyed by release name
    pub values: BTreeMap<String, Vec<String>>,
    /// Values files keyed by release name
    pub value_files: BTreeMap<String, Vec<String>>,
    pub env: BTreeMap<String, String>,
    /// Bound on the job runner's wait/status calls
    #[serde(with = "duration_serde::human")]
    pub timeout: Duration,
    /// Port every worker listens on
    pub port: u16,
    /// DNS suffix appended to `<worker>.<namespace>`
    pub cluster_domain: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            id: generate_run_id(),
            suites: Vec::new(),
            benchmark: None,
            workers: 1,
            parallelism: 1,
            bounds: RunBounds::Iterations(1),
            max_latency: None,
            args: BTreeMap::new(),
            deploy: DeployConfig::default(),
            registry: BTreeMap::new(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            image_pull_policy: "IfNotPresent".to_string(),
            executable: None,
            context: None,
            values: BTreeMap::new(),
            value_files: BTreeMap::new(),
            env: BTreeMap::new(),
            timeout: Duration::from_secs(600),
            port: DEFAULT_WORKER_PORT,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
        }
    }
}

/// Generate a run identifier such as `benchmesh-k3x9q2ab`
pub fn generate_run_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}", APP_NAME, suffix)
}

impl RunBounds {
    /// Split the bounds across `workers`: the per-worker request count and
    /// the optional duration. Iteration counts are divided with truncation.
    pub fn per_worker(&self, workers: usize) -> (u64, Option<Duration>) {
        match *self {
            RunBounds::Iterations(total) => (total / workers.max(1) as u64, None),
            RunBounds::Duration(duration) => (0, Some(duration)),
        }
    }
}

impl RunConfig {
    /// Create a new run configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(BenchError::Config("Run id must not be empty".to_string()));
        }

        if self.workers == 0 {
            return Err(BenchError::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.parallelism == 0 {
            return Err(BenchError::Config(
                "Parallelism must be greater than 0".to_string(),
            ));
        }

        match self.bounds {
            RunBounds::Iterations(0) => {
                return Err(BenchError::Config(
                    "Iteration count must be greater than 0".to_string(),
                ));
            }
            RunBounds::Iterations(total) if total < self.workers as u64 => {
                return Err(BenchError::Config(format!(
                    "Iteration count {} is smaller than the worker count {}",
                    total, self.workers
                )));
            }
            RunBounds::Duration(duration) if duration.is_zero() => {
                return Err(BenchError::Config(
                    "Duration must be greater than 0".to_string(),
                ));
            }
            _ => {}
        }

        if self.suites.iter().any(|s| s.trim().is_empty()) {
            return Err(BenchError::Config(
                "Suite names must not be empty".to_string(),
            ));
        }

        // each suite's task owns the namespace `<id>-<suite>`
        for (i, suite) in self.suites.iter().enumerate() {
            if self.suites[..i].contains(suite) {
                return Err(BenchError::Config(format!(
                    "Suite {} is selected more than once",
                    suite
                )));
            }
        }

        if let Some(benchmark) = &self.benchmark {
            if benchmark.trim().is_empty() {
                return Err(BenchError::Config(
                    "Benchmark name must not be empty".to_string(),
                ));
            }
        }

        if let Some(max) = self.max_latency {
            if max.is_zero() {
                return Err(BenchError::Config(
                    "Maximum latency must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Derive the configuration of one suite's task: the id becomes
    /// `<run-id>-<suite>` and only that suite is selected.
    pub fn scoped_to(&self, suite: &str) -> Self {
        Self {
            id: format!("{}-{}", self.id, suite),
            suites: vec![suite.to_string()],
            ..self.clone()
        }
    }

    /// Set the run identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a suite to run
    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.suites.push(suite.into());
        self
    }

    /// Run only the named benchmark
    pub fn with_benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }

    /// Set the worker pool size
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-worker parallelism
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Bound each benchmark by a total iteration count
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.bounds = RunBounds::Iterations(iterations);
        self
    }

    /// Bound each benchmark by wall-clock time
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.bounds = RunBounds::Duration(duration);
        self
    }

    /// Set the latency threshold
    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    /// Add a pass-through argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Set the deployment parameters
    pub fn with_deploy(mut self, deploy: DeployConfig) -> Self {
        self.deploy = deploy;
        self
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            BenchError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load(&config_path)
    }

    /// Serialize the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/benchmesh/benchmesh.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            BenchError::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_generated_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("benchmesh-"));
        assert_eq!(id.len(), "benchmesh-".len() + 8);
        assert_ne!(generate_run_id(), id);
    }

    #[test]
    fn test_per_worker_split_truncates() {
        assert_eq!(RunBounds::Iterations(1000).per_worker(3), (333, None));
        assert_eq!(RunBounds::Iterations(10).per_worker(1), (10, None));
        let d = Duration::from_secs(30);
        assert_eq!(RunBounds::Duration(d).per_worker(4), (0, Some(d)));
    }

    #[test]
    fn test_dispatched_total_loses_remainder() {
        for workers in 1..=7usize {
            for total in [workers as u64, 10, 99, 1000, 1001] {
                let (each, _) = RunBounds::Iterations(total).per_worker(workers);
                assert_eq!(each * workers as u64, total - total % workers as u64);
            }
        }
    }

    #[test]
    fn test_validation() {
        assert!(RunConfig::new().validate().is_ok());
        assert!(RunConfig::new().with_workers(0).validate().is_err());
        assert!(RunConfig::new().with_parallelism(0).validate().is_err());
        assert!(RunConfig::new().with_iterations(0).validate().is_err());
        assert!(RunConfig::new()
            .with_workers(4)
            .with_iterations(3)
            .validate()
            .is_err());
        assert!(RunConfig::new()
            .with_duration(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RunConfig::new().with_benchmark("  ").validate().is_err());
        assert!(RunConfig::new().with_id("").validate().is_err());
    }

    #[test]
    fn test_duplicate_suites_rejected() {
        let config = RunConfig::new().with_id("run").with_suite("map").with_suite("map");
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));

        let distinct = RunConfig::new().with_id("run").with_suite("map").with_suite("set");
        assert!(distinct.validate().is_ok());
    }

    #[test]
    fn test_scoped_to_suite() {
        let config = RunConfig::new().with_id("run").with_suite("a").with_suite("b");
        let scoped = config.scoped_to("b");
        assert_eq!(scoped.id, "run-b");
        assert_eq!(scoped.suites, vec!["b".to_string()]);
        assert_eq!(scoped.workers, config.workers);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RunConfig::new()
            .with_id("nightly")
            .with_suite("map")
            .with_workers(3)
            .with_duration(Duration::from_secs(30))
            .with_max_latency(Duration::from_millis(10))
            .with_arg("replicas", "3");
        let text = config.to_toml().expect("Failed to serialize to TOML");
        let parsed: RunConfig = toml::from_str(&text).expect("Failed to parse TOML");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
id = "nightly"
suites = ["map"]
workers = 2
parallelism = 8
max_latency = "25ms"
bounds = {{ iterations = 1000 }}

[args]
replicas = "3"

[deploy]
image = "example/bench:latest"
timeout = "5m"

[registry]
map = ["Put", "Get"]
"#
        )
        .unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.id, "nightly");
        assert_eq!(config.workers, 2);
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.bounds, RunBounds::Iterations(1000));
        assert_eq!(config.max_latency, Some(Duration::from_millis(25)));
        assert_eq!(config.args.get("replicas").map(String::as_str), Some("3"));
        assert_eq!(config.deploy.image, "example/bench:latest");
        assert_eq!(config.deploy.timeout, Duration::from_secs(300));
        assert_eq!(config.deploy.port, DEFAULT_WORKER_PORT);
        assert_eq!(config.registry["map"], vec!["Put".to_string(), "Get".to_string()]);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = 0").unwrap();
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_config_file_path() {
        let path = RunConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("benchmesh.toml"));
    }
}
