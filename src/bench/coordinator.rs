//! Suite coordinator
//!
//! Resolves the suites to run, creates one [`WorkerTask`] per suite with a
//! private, suite-scoped run id, runs them concurrently and reduces their
//! outcomes to one exit status.

use async_trait::async_trait;
use std::sync::Arc;

use crate::bench::WorkerTask;
use crate::config::RunConfig;
use crate::console::{Context, Joiner};
use crate::job::JobRunnerFactory;
use crate::registry::Registry;
use crate::rpc::Connector;
use crate::{BenchError, Result};

/// A unit of work the coordinator runs for one suite
#[async_trait]
pub trait SuiteTask: Send {
    fn suite(&self) -> &str;

    /// Run to completion, returning the suite's exit status
    async fn run(&mut self, ctx: &Context) -> Result<i32>;
}

pub struct Coordinator {
    config: RunConfig,
    registry: Arc<Registry>,
    runners: Arc<dyn JobRunnerFactory>,
    connector: Arc<dyn Connector>,
}

impl Coordinator {
    pub fn new(
        config: RunConfig,
        registry: Arc<Registry>,
        runners: Arc<dyn JobRunnerFactory>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            runners,
            connector,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Configured suites, or every registered suite when none is named
    pub fn suites(&self) -> Result<Vec<String>> {
        if !self.config.suites.is_empty() {
            return Ok(self.config.suites.clone());
        }
        let suites = self.registry.list_suites();
        if suites.is_empty() {
            return Err(BenchError::Registry(
                "no benchmark suites are registered".to_string(),
            ));
        }
        Ok(suites)
    }

    /// One task per suite, each in its own namespace
    pub fn tasks(&self) -> Result<Vec<WorkerTask>> {
        let tasks = self
            .suites()?
            .into_iter()
            .map(|suite| {
                let config = self.config.scoped_to(&suite);
                let runner = self.runners.for_namespace(&config.id);
                WorkerTask::new(
                    suite,
                    config,
                    Arc::clone(&self.registry),
                    runner,
                    Arc::clone(&self.connector),
                )
            })
            .collect();
        Ok(tasks)
    }

    pub async fn run(&self, ctx: &Context) -> Result<i32> {
        let tasks = self
            .tasks()?
            .into_iter()
            .map(|task| Box::new(task) as Box<dyn SuiteTask>)
            .collect();
        run_tasks(ctx, tasks).await
    }
}

/// Run every task concurrently and wait for all of them.
///
/// Returns the first error in task order if any task failed; otherwise the
/// first non-zero exit status, or 0. A failing task never cancels its
/// siblings.
pub async fn run_tasks(ctx: &Context, tasks: Vec<Box<dyn SuiteTask>>) -> Result<i32> {
    let mut joiners: Vec<Joiner<i32>> = tasks
        .into_iter()
        .map(|mut task| {
            let description = format!("Run benchmark suite {}", task.suite());
            ctx.fork(description, move |ctx| async move { task.run(&ctx).await })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(joiners.len());
    for joiner in joiners.iter_mut() {
        outcomes.push(joiner.join().await);
    }

    if let Some(err) = outcomes.iter().find_map(|o| o.as_ref().err()) {
        tracing::warn!(error = %err, "benchmark run failed");
        return Err(err.clone());
    }

    let code = outcomes
        .into_iter()
        .filter_map(|o| o.ok())
        .find(|code| *code != 0)
        .unwrap_or(0);
    tracing::info!(code, "benchmark run finished");
    Ok(code)
}
