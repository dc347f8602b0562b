//! Per-suite worker task
//!
//! A [`WorkerTask`] provisions the suite's worker pool, drives it through
//! `SetupSuite`, `SetupWorker` and one `SetupBenchmark`/`RunBenchmark` pair
//! per benchmark, prints the aggregated report and always tears the pool
//! down, whatever happened before.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

use crate::bench::coordinator::SuiteTask;
use crate::bench::{worker_name, WorkerPool};
use crate::config::RunConfig;
use crate::console::{self, Context, Joiner, Status};
use crate::job::{JobRunner, JobSpec, JobState};
use crate::models::{aggregate, BenchmarkResult, SuiteReport};
use crate::registry::Registry;
use crate::rpc::{phase, BenchmarkRequest, Connector, RunRequest, SuiteRequest, WorkerService};
use crate::{BenchError, Result};

/// Lifecycle of a worker task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Created,
    ProvisioningPool,
    SettingUpSuite,
    SettingUpWorkers,
    SettingUpBenchmark(String),
    Running(String),
    Aggregating,
    TearingDown,
    Succeeded,
    Failed(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::ProvisioningPool => write!(f, "provisioning worker pool"),
            TaskState::SettingUpSuite => write!(f, "setting up suite"),
            TaskState::SettingUpWorkers => write!(f, "setting up workers"),
            TaskState::SettingUpBenchmark(b) => write!(f, "setting up benchmark {}", b),
            TaskState::Running(b) => write!(f, "running benchmark {}", b),
            TaskState::Aggregating => write!(f, "aggregating results"),
            TaskState::TearingDown => write!(f, "tearing down"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Shared record of every state a task has entered
#[derive(Debug, Clone)]
pub struct StateTracker {
    history: Arc<Mutex<Vec<TaskState>>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![TaskState::Created])),
        }
    }
}

impl StateTracker {
    fn enter(&self, state: TaskState) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(state);
    }

    /// The most recent state
    pub fn current(&self) -> TaskState {
        self.history()
            .last()
            .cloned()
            .unwrap_or(TaskState::Created)
    }

    /// Every state entered so far, oldest first
    pub fn history(&self) -> Vec<TaskState> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Issues the phase calls of one suite against its pool
#[derive(Clone)]
struct PhaseDriver {
    suite: String,
    config: Arc<RunConfig>,
    pool: Arc<WorkerPool>,
    runner: Arc<dyn JobRunner>,
}

impl PhaseDriver {
    fn suite_request(&self) -> SuiteRequest {
        SuiteRequest {
            suite: self.suite.clone(),
            args: self.config.args.clone(),
        }
    }

    async fn provision(&self) -> Result<()> {
        self.runner
            .create_namespace()
            .await
            .map_err(as_provisioning)?;

        let mut joiners: Vec<Joiner> = (0..self.config.workers)
            .map(|ordinal| {
                let runner = Arc::clone(&self.runner);
                let spec = JobSpec::for_worker(&self.config, ordinal);
                Joiner::spawn(async move { runner.start_job(spec?).await })
            })
            .collect();
        console::join(&mut joiners).await.map_err(as_provisioning)?;

        tracing::info!(suite = %self.suite, workers = self.config.workers, "worker pool provisioned");
        Ok(())
    }

    async fn setup_suite(&self) -> Result<()> {
        let workers = self.pool.resolve().await?;
        let first = workers
            .first()
            .ok_or_else(|| BenchError::phase(phase::SETUP_SUITE, "worker pool is empty"))?;
        first.setup_suite(self.suite_request()).await
    }

    async fn setup_workers(&self) -> Result<()> {
        let request = self.suite_request();
        self.fan_out(phase::SETUP_WORKER, move |worker| {
            let request = request.clone();
            async move { worker.setup_worker(request).await }
        })
        .await
        .map(|_| ())
    }

    async fn setup_benchmark(&self, benchmark: &str) -> Result<()> {
        let request = BenchmarkRequest {
            suite: self.suite.clone(),
            benchmark: benchmark.to_string(),
            args: self.config.args.clone(),
        };
        self.fan_out(phase::SETUP_BENCHMARK, move |worker| {
            let request = request.clone();
            async move { worker.setup_benchmark(request).await }
        })
        .await
        .map(|_| ())
    }

    async fn run_benchmark(&self, benchmark: &str) -> Result<BenchmarkResult> {
        let (requests, duration) = self.config.bounds.per_worker(self.config.workers);
        let request = RunRequest {
            suite: self.suite.clone(),
            benchmark: benchmark.to_string(),
            requests,
            duration,
            max_latency: self.config.max_latency,
            parallelism: self.config.parallelism,
            args: self.config.args.clone(),
        };
        let results = self
            .fan_out(phase::RUN_BENCHMARK, move |worker| {
                let request = request.clone();
                async move { worker.run_benchmark(request).await }
            })
            .await?;
        Ok(aggregate(benchmark, &results))
    }

    /// Call every worker concurrently and wait for all of them. Calls are
    /// never cancelled; the first error in ordinal order wins.
    async fn fan_out<T, F, Fut>(&self, phase: &'static str, call: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn WorkerService>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let workers = self.pool.resolve().await?;
        let handles: Vec<_> = workers
            .iter()
            .map(|worker| tokio::spawn(call(Arc::clone(worker))))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (ordinal, handle) in handles.into_iter().enumerate() {
            match handle.await.map_err(BenchError::from).and_then(|r| r) {
                Ok(value) => results.push(value),
                Err(err) => {
                    tracing::warn!(suite = %self.suite, worker = ordinal, phase, error = %err, "worker call failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    /// Worst exit code reported by the pool's jobs
    async fn exit_code(&self) -> Result<i32> {
        let mut code = 0;
        for ordinal in 0..self.config.workers {
            let status = self.runner.get_status(&worker_name(ordinal)).await?;
            let worker_code = match status.state {
                JobState::Failed if status.exit_code == 0 => 1,
                _ => status.exit_code,
            };
            code = code.max(worker_code);
        }
        Ok(code)
    }

    /// Copy every worker's logs beneath the status line
    async fn dump_logs(&self, status: &Status) {
        for ordinal in 0..self.config.workers {
            let name = worker_name(ordinal);
            let mut text = String::new();
            let read = match self.runner.get_logs(&name).await {
                Ok(mut stream) => stream.read_to_string(&mut text).await.map_err(BenchError::from),
                Err(err) => Err(err),
            };
            match read {
                Ok(_) => {
                    for line in text.lines() {
                        status.log(format!("{}: {}", name, line));
                    }
                }
                Err(err) => {
                    tracing::debug!(suite = %self.suite, worker = %name, error = %err, "failed to read worker logs")
                }
            }
        }
    }

    async fn teardown(&self) {
        match self.runner.delete_namespace().await {
            Ok(()) => tracing::info!(suite = %self.suite, namespace = %self.config.id, "worker pool torn down"),
            Err(err) => {
                tracing::warn!(suite = %self.suite, namespace = %self.config.id, error = %err, "teardown failed")
            }
        }
    }
}

fn as_provisioning(err: BenchError) -> BenchError {
    match err {
        BenchError::Provisioning(_) => err,
        other => BenchError::Provisioning(other.to_string()),
    }
}

/// Runs one suite across its own worker pool
pub struct WorkerTask {
    driver: PhaseDriver,
    registry: Arc<Registry>,
    states: StateTracker,
}

impl fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTask")
            .field("suite", &self.driver.suite)
            .field("id", &self.driver.config.id)
            .field("state", &self.states.current())
            .finish()
    }
}

impl WorkerTask {
    /// `config` must already be scoped to the suite
    pub fn new(
        suite: impl Into<String>,
        config: RunConfig,
        registry: Arc<Registry>,
        runner: Arc<dyn JobRunner>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(&config, connector));
        Self {
            driver: PhaseDriver {
                suite: suite.into(),
                config: Arc::new(config),
                pool,
                runner,
            },
            registry,
            states: StateTracker::default(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.driver.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.driver.pool
    }

    /// Handle on the task's state history that outlives the task
    pub fn states(&self) -> StateTracker {
        self.states.clone()
    }

    fn benchmarks(&self) -> Result<Vec<String>> {
        match &self.driver.config.benchmark {
            Some(benchmark) => Ok(vec![benchmark.clone()]),
            None => Ok(self.registry.get_suite(&self.driver.suite)?.to_vec()),
        }
    }

    /// Run one step under its own status line, entering `state` first.
    async fn step<T, F, Fut>(&self, ctx: &Context, state: TaskState, f: F) -> Result<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(PhaseDriver) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        tracing::debug!(suite = %self.driver.suite, state = %state, "entering state");
        let message = capitalize(&state.to_string());
        self.states.enter(state);

        let driver = self.driver.clone();
        ctx.run(move |status| async move {
            status.report(message);
            let result = f(driver.clone()).await;
            if result.is_err() && status.is_verbose() {
                driver.dump_logs(&status).await;
            }
            result
        })
        .wait()
        .await
    }

    async fn execute(&self, ctx: &Context) -> Result<i32> {
        let benchmarks = self.benchmarks()?;

        self.step(ctx, TaskState::ProvisioningPool, |d| async move { d.provision().await })
            .await?;
        self.step(ctx, TaskState::SettingUpSuite, |d| async move { d.setup_suite().await })
            .await?;
        self.step(ctx, TaskState::SettingUpWorkers, |d| async move { d.setup_workers().await })
            .await?;

        let mut results = Vec::with_capacity(benchmarks.len());
        for benchmark in benchmarks {
            let task = self.fork_view();
            let name = benchmark.clone();
            let result = ctx
                .fork(format!("Run benchmark {}", benchmark), move |ctx| async move {
                    let b = name.clone();
                    task.step(&ctx, TaskState::SettingUpBenchmark(name.clone()), move |d| async move {
                        d.setup_benchmark(&b).await
                    })
                    .await?;
                    let b = name.clone();
                    task.step(&ctx, TaskState::Running(name), move |d| async move {
                        d.run_benchmark(&b).await
                    })
                    .await
                })
                .join()
                .await;

            match result {
                Ok(result) => {
                    tracing::info!(suite = %self.driver.suite, benchmark = %benchmark, "{}", result.summary());
                    results.push(result);
                }
                Err(err) => {
                    tracing::warn!(suite = %self.driver.suite, benchmark = %benchmark, error = %err, "benchmark failed, skipping the rest of the suite");
                    return Err(err);
                }
            }
        }

        self.states.enter(TaskState::Aggregating);
        let report = SuiteReport::new(self.driver.suite.clone(), results);
        ctx.println(report.render());
        report.check_max_latency(self.driver.config.max_latency)?;

        self.driver.exit_code().await
    }

    /// Cheap copy sharing the driver and state history, for forked scopes
    fn fork_view(&self) -> WorkerTask {
        WorkerTask {
            driver: self.driver.clone(),
            registry: Arc::clone(&self.registry),
            states: self.states.clone(),
        }
    }
}

#[async_trait]
impl SuiteTask for WorkerTask {
    fn suite(&self) -> &str {
        &self.driver.suite
    }

    /// Execute the suite and tear down exactly once, returning the worst
    /// worker exit code on success.
    async fn run(&mut self, ctx: &Context) -> Result<i32> {
        tracing::info!(suite = %self.driver.suite, id = %self.driver.config.id, workers = self.driver.config.workers, "starting suite");
        let outcome = self.execute(ctx).await;

        self.states.enter(TaskState::TearingDown);
        self.driver.teardown().await;

        match outcome {
            Ok(code) => {
                self.states.enter(TaskState::Succeeded);
                tracing::info!(suite = %self.driver.suite, code, "suite finished");
                Ok(code)
            }
            Err(err) => {
                self.states.enter(TaskState::Failed(err.to_string()));
                tracing::warn!(suite = %self.driver.suite, error = %err, "suite failed");
                Err(err)
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tracker_history() {
        let states = StateTracker::default();
        assert_eq!(states.current(), TaskState::Created);
        states.enter(TaskState::ProvisioningPool);
        states.enter(TaskState::Failed("boom".to_string()));

        assert!(states.current().is_terminal());
        assert_eq!(states.history().len(), 3);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            TaskState::SettingUpBenchmark("Get".to_string()).to_string(),
            "setting up benchmark Get"
        );
        assert_eq!(capitalize("running benchmark Get"), "Running benchmark Get");
    }

    #[test]
    fn test_provisioning_errors_are_not_rewrapped() {
        let err = as_provisioning(BenchError::Provisioning("quota".to_string()));
        assert_eq!(err, BenchError::Provisioning("quota".to_string()));
        let err = as_provisioning(BenchError::Io("disk".to_string()));
        assert_eq!(err, BenchError::Provisioning("I/O error: disk".to_string()));
    }
}
