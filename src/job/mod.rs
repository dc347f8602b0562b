//! Job runner boundary
//!
//! Creating namespaces and starting worker jobs in the cluster is done by an
//! external collaborator. This module defines what the engine needs from it,
//! plus [`StaticRunner`] for worker pools deployed out-of-band.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::config::RunConfig;
use crate::Result;

/// Environment variable naming the worker's namespace
pub const NAMESPACE_ENV: &str = "BENCHMESH_NAMESPACE";
/// Environment variable naming the job's role
pub const ROLE_ENV: &str = "BENCHMESH_ROLE";
/// Environment variable carrying the worker ordinal
pub const WORKER_ENV: &str = "BENCHMESH_WORKER";
/// Environment variable naming the owning run
pub const JOB_ENV: &str = "BENCHMESH_JOB";
/// Environment variable carrying the JSON-encoded run configuration
pub const CONFIG_ENV: &str = "BENCHMESH_CONFIG";

/// Byte stream of a job's logs
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Everything the runner needs to start one worker job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub id: String,
    pub namespace: String,
    pub image: String,
    pub image_pull_policy: String,
    pub executable: Option<String>,
    pub context: Option<PathBuf>,
    pub values: BTreeMap<String, Vec<String>>,
    pub value_files: BTreeMap<String, Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl JobSpec {
    /// Spec for worker `ordinal` of the pool configured by `config`.
    pub fn for_worker(config: &RunConfig, ordinal: usize) -> Result<Self> {
        let deploy = &config.deploy;
        let mut env = deploy.env.clone();
        env.insert(NAMESPACE_ENV.to_string(), config.id.clone());
        env.insert(ROLE_ENV.to_string(), "worker".to_string());
        env.insert(WORKER_ENV.to_string(), ordinal.to_string());
        env.insert(JOB_ENV.to_string(), config.id.clone());
        env.insert(CONFIG_ENV.to_string(), serde_json::to_string(config)?);

        Ok(Self {
            id: crate::bench::worker_name(ordinal),
            namespace: config.id.clone(),
            image: deploy.image.clone(),
            image_pull_policy: deploy.image_pull_policy.clone(),
            executable: deploy.executable.clone(),
            context: deploy.context.clone(),
            values: deploy.values.clone(),
            value_files: deploy.value_files.clone(),
            env,
            timeout: deploy.timeout,
        })
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// State and exit code reported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub exit_code: i32,
}

impl JobStatus {
    pub fn new(state: JobState, exit_code: i32) -> Self {
        Self { state, exit_code }
    }
}

/// Namespace-scoped job runner
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn create_namespace(&self) -> Result<()>;

    async fn start_job(&self, job: JobSpec) -> Result<()>;

    async fn delete_namespace(&self) -> Result<()>;

    async fn get_logs(&self, job_id: &str) -> Result<LogStream>;

    async fn get_status(&self, job_id: &str) -> Result<JobStatus>;
}

/// Produces the runner for one suite's namespace
pub trait JobRunnerFactory: Send + Sync {
    fn for_namespace(&self, namespace: &str) -> Arc<dyn JobRunner>;
}

impl<F> JobRunnerFactory for F
where
    F: Fn(&str) -> Arc<dyn JobRunner> + Send + Sync,
{
    fn for_namespace(&self, namespace: &str) -> Arc<dyn JobRunner> {
        self(namespace)
    }
}

/// Runner for pools that already exist: lifecycle calls are no-ops and
/// every job reports as running.
#[derive(Debug, Clone)]
pub struct StaticRunner {
    namespace: String,
}

impl StaticRunner {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Factory handing out a [`StaticRunner`] per namespace
    pub fn factory() -> Arc<dyn JobRunnerFactory> {
        Arc::new(|namespace: &str| -> Arc<dyn JobRunner> { Arc::new(StaticRunner::new(namespace)) })
    }
}

#[async_trait]
impl JobRunner for StaticRunner {
    async fn create_namespace(&self) -> Result<()> {
        tracing::debug!(namespace = %self.namespace, "using pre-provisioned namespace");
        Ok(())
    }

    async fn start_job(&self, job: JobSpec) -> Result<()> {
        tracing::debug!(namespace = %self.namespace, job = %job.id, "assuming worker job is already running");
        Ok(())
    }

    async fn delete_namespace(&self) -> Result<()> {
        tracing::debug!(namespace = %self.namespace, "leaving pre-provisioned namespace in place");
        Ok(())
    }

    async fn get_logs(&self, _job_id: &str) -> Result<LogStream> {
        Ok(Box::pin(tokio::io::empty()))
    }

    async fn get_status(&self, _job_id: &str) -> Result<JobStatus> {
        Ok(JobStatus::new(JobState::Running, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_worker_job_spec() {
        let config = RunConfig::new().with_id("run-map").with_workers(3);
        let spec = JobSpec::for_worker(&config, 2).unwrap();

        assert_eq!(spec.id, "worker-2");
        assert_eq!(spec.namespace, "run-map");
        assert_eq!(spec.env[WORKER_ENV], "2");
        assert_eq!(spec.env[ROLE_ENV], "worker");
        assert_eq!(spec.env[NAMESPACE_ENV], "run-map");

        let decoded: RunConfig = serde_json::from_str(&spec.env[CONFIG_ENV]).unwrap();
        assert_eq!(decoded, config);
    }

    #[tokio::test]
    async fn test_static_runner() {
        let runner = StaticRunner::factory().for_namespace("ns");
        runner.create_namespace().await.unwrap();
        assert_eq!(
            runner.get_status("worker-0").await.unwrap(),
            JobStatus::new(JobState::Running, 0)
        );
        let mut logs = String::new();
        runner
            .get_logs("worker-0")
            .await
            .unwrap()
            .read_to_string(&mut logs)
            .await
            .unwrap();
        assert!(logs.is_empty());
        runner.delete_namespace().await.unwrap();
    }
}
