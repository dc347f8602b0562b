//! Worker handle set
//!
//! One RPC handle per worker ordinal, resolved on first use and reused for
//! every phase of the owning task.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::bench::worker_address;
use crate::config::RunConfig;
use crate::rpc::{Connector, WorkerService};
use crate::Result;

/// Ordered handles for a worker pool
pub type Handles = Arc<[Arc<dyn WorkerService>]>;

pub struct WorkerPool {
    addresses: Vec<String>,
    connector: Arc<dyn Connector>,
    handles: OnceCell<Handles>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("addresses", &self.addresses)
            .field("resolved", &self.handles.initialized())
            .finish()
    }
}

impl WorkerPool {
    /// Pool of `config.workers` workers addressed within `config.id`
    pub fn new(config: &RunConfig, connector: Arc<dyn Connector>) -> Self {
        let addresses = (0..config.workers)
            .map(|ordinal| worker_address(ordinal, &config.id, &config.deploy))
            .collect();

        Self {
            addresses,
            connector,
            handles: OnceCell::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.addresses.len()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Connect to every worker on the first call and return the cached
    /// handles afterwards. Any failed connection fails the whole pool.
    pub async fn resolve(&self) -> Result<Handles> {
        let handles = self
            .handles
            .get_or_try_init(|| async {
                let mut handles = Vec::with_capacity(self.addresses.len());
                for (ordinal, address) in self.addresses.iter().enumerate() {
                    let handle = self.connector.connect(address).await.map_err(|err| {
                        tracing::warn!(worker = ordinal, %address, error = %err, "failed to connect to worker");
                        err
                    })?;
                    handles.push(handle);
                }
                tracing::debug!(workers = handles.len(), "resolved worker pool");
                Ok::<Handles, crate::BenchError>(handles.into())
            })
            .await?;
        Ok(Arc::clone(handles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhaseResult;
    use crate::rpc::{BenchmarkRequest, RunRequest, SuiteRequest};
    use crate::BenchError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Idle;

    #[async_trait]
    impl WorkerService for Idle {
        async fn setup_suite(&self, _: SuiteRequest) -> Result<()> {
            Ok(())
        }
        async fn setup_worker(&self, _: SuiteRequest) -> Result<()> {
            Ok(())
        }
        async fn setup_benchmark(&self, _: BenchmarkRequest) -> Result<()> {
            Ok(())
        }
        async fn run_benchmark(&self, _: RunRequest) -> Result<PhaseResult> {
            Ok(PhaseResult::default())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        dialed: Mutex<Vec<String>>,
        refuse: Option<String>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, address: &str) -> Result<Arc<dyn WorkerService>> {
            self.dialed.lock().unwrap().push(address.to_string());
            if self.refuse.as_deref() == Some(address) {
                return Err(BenchError::Connectivity(format!("{} refused", address)));
            }
            Ok(Arc::new(Idle))
        }
    }

    #[tokio::test]
    async fn test_resolve_is_memoized() {
        let connector = Arc::new(CountingConnector::default());
        let config = RunConfig::new().with_id("run-map").with_workers(3);
        let pool = WorkerPool::new(&config, connector.clone());

        let first = pool.resolve().await.unwrap();
        let second = pool.resolve().await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            *connector.dialed.lock().unwrap(),
            vec![
                "worker-0.run-map.svc.cluster.local:5000",
                "worker-1.run-map.svc.cluster.local:5000",
                "worker-2.run-map.svc.cluster.local:5000",
            ]
        );
    }

    #[tokio::test]
    async fn test_one_failed_connection_fails_the_pool() {
        let connector = Arc::new(CountingConnector {
            refuse: Some("worker-1.run-map.svc.cluster.local:5000".to_string()),
            ..Default::default()
        });
        let config = RunConfig::new().with_id("run-map").with_workers(3);
        let pool = WorkerPool::new(&config, connector);

        assert!(matches!(
            pool.resolve().await,
            Err(BenchError::Connectivity(_))
        ));
    }
}
