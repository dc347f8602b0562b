//! HTTP/JSON worker client
//!
//! Every phase is a `POST /<phase>` with a JSON body over plain HTTP. Calls
//! that find the worker unavailable (connection refused, connect timeout,
//! HTTP 503) are retried with exponential backoff; anything else fails the
//! call immediately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{retry_async, RetryPolicy};
use crate::models::PhaseResult;
use crate::rpc::{phase, BenchmarkRequest, Connector, RunRequest, SuiteRequest, WorkerService};
use crate::{BenchError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a single worker endpoint
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    address: String,
    base_url: Url,
    client: Client,
    retry: RetryPolicy,
}

impl HttpWorkerClient {
    pub fn new(address: impl Into<String>, client: Client, retry: RetryPolicy) -> Result<Self> {
        let address = address.into();
        let base_url = Url::parse(&format!("http://{}/", address)).map_err(|e| {
            BenchError::Connectivity(format!("invalid worker address {}: {}", address, e))
        })?;

        Ok(Self {
            address,
            base_url,
            client,
            retry,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call<Req>(&self, phase: &'static str, body: &Req) -> Result<reqwest::Response>
    where
        Req: Serialize + Sync,
    {
        tracing::debug!(worker = %self.address, phase, "calling worker");
        retry_async(|| self.post(phase, body), &self.retry).await
    }

    async fn post<Req>(&self, phase: &'static str, body: &Req) -> Result<reqwest::Response>
    where
        Req: Serialize + Sync,
    {
        let url = self
            .base_url
            .join(phase)
            .map_err(|e| BenchError::phase(phase, e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| self.transport_error(phase, err))?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(BenchError::Unavailable {
                address: self.address.clone(),
                message: format!("{} answered {}", phase, status),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match text.trim() {
                "" => status.to_string(),
                body => body.to_string(),
            };
            return Err(BenchError::phase(phase, message));
        }
        Ok(response)
    }

    fn transport_error(&self, phase: &'static str, err: reqwest::Error) -> BenchError {
        if err.is_connect() || err.is_timeout() {
            BenchError::Unavailable {
                address: self.address.clone(),
                message: err.to_string(),
            }
        } else {
            BenchError::phase(phase, err.to_string())
        }
    }
}

#[async_trait]
impl WorkerService for HttpWorkerClient {
    async fn setup_suite(&self, request: SuiteRequest) -> Result<()> {
        self.call(phase::SETUP_SUITE, &request).await.map(|_| ())
    }

    async fn setup_worker(&self, request: SuiteRequest) -> Result<()> {
        self.call(phase::SETUP_WORKER, &request).await.map(|_| ())
    }

    async fn setup_benchmark(&self, request: BenchmarkRequest) -> Result<()> {
        self.call(phase::SETUP_BENCHMARK, &request).await.map(|_| ())
    }

    async fn run_benchmark(&self, request: RunRequest) -> Result<PhaseResult> {
        let response = self.call(phase::RUN_BENCHMARK, &request).await?;
        response.json::<PhaseResult>().await.map_err(|e| {
            BenchError::phase(phase::RUN_BENCHMARK, format!("invalid response: {}", e))
        })
    }
}

/// Opens [`HttpWorkerClient`]s sharing one connection pool
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
    retry: RetryPolicy,
}

impl HttpConnector {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BenchError::Connectivity(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy used by every client
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn WorkerService>> {
        let client = HttpWorkerClient::new(address, self.client.clone(), self.retry.clone())?;
        Ok(Arc::new(client))
    }
}
