//! Benchmark engine module
//!
//! Contains the worker pool, the per-suite worker task that drives the
//! phase protocol, and the coordinator that runs one task per suite.

pub mod coordinator;
pub mod pool;
pub mod task;

use crate::config::DeployConfig;

pub use coordinator::{run_tasks, Coordinator, SuiteTask};
pub use pool::WorkerPool;
pub use task::{StateTracker, TaskState, WorkerTask};

/// Job name of the worker with the given ordinal
pub fn worker_name(ordinal: usize) -> String {
    format!("worker-{}", ordinal)
}

/// Address of a worker inside its run's namespace
///
/// # Examples
///
/// ```
/// use benchmesh::bench::worker_address;
/// use benchmesh::config::DeployConfig;
///
/// let address = worker_address(1, "run-map", &DeployConfig::default());
/// assert_eq!(address, "worker-1.run-map.svc.cluster.local:5000");
/// ```
pub fn worker_address(ordinal: usize, run_id: &str, deploy: &DeployConfig) -> String {
    format!(
        "{}.{}.{}:{}",
        worker_name(ordinal),
        run_id,
        deploy.cluster_domain,
        deploy.port
    )
}
