//! # Request Executor
//!
//! One upstream call as a single unit: gate slot, credential, proxy and
//! header leases, the call itself, then success/failure feedback to every
//! pool the call drew from. The engine only sees a page or an error.

use core_logic::{
    CoreError, CrawlMetrics, CredentialPool, HoldersApi, HoldersPage, PageRequest, PoolError,
    PoolLease, RequestGate, ResourcePool, RequestRoute, RetryConfig,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct RequestExecutor {
    api: Arc<dyn HoldersApi>,
    gate: RequestGate,
    credentials: Arc<CredentialPool>,
    proxies: Option<Arc<ResourcePool>>,
    headers: Option<Arc<ResourcePool>>,
    pool_retry: RetryConfig,
    metrics: Arc<CrawlMetrics>,
}

impl RequestExecutor {
    /// Direct connections, no header rotation
    pub fn new(
        api: Arc<dyn HoldersApi>,
        gate: RequestGate,
        credentials: Arc<CredentialPool>,
        metrics: Arc<CrawlMetrics>,
    ) -> Self {
        Self {
            api,
            gate,
            credentials,
            proxies: None,
            headers: None,
            pool_retry: RetryConfig::default(),
            metrics,
        }
    }

    /// Routes calls through `pool`. An empty pool keeps direct connections.
    pub fn with_proxies(mut self, pool: Arc<ResourcePool>) -> Self {
        self.proxies = Some(pool).filter(|p| !p.is_empty());
        self
    }

    pub fn with_headers(mut self, pool: Arc<ResourcePool>) -> Self {
        self.headers = Some(pool).filter(|p| !p.is_empty());
        self
    }

    /// Bounded wait for a pool entry when every entry is momentarily
    /// unavailable
    pub fn with_pool_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.pool_retry = RetryConfig::new(attempts, delay_ms);
        self
    }

    pub fn proxies(&self) -> Option<&Arc<ResourcePool>> {
        self.proxies.as_ref()
    }

    pub async fn execute(&self, request: &PageRequest) -> Result<HoldersPage, CoreError> {
        let _permit = self.gate.acquire().await;

        let api_key = self.credentials.next_key().to_string();
        let proxy = self.lease(self.proxies.as_deref()).await?;
        let header = self.lease(self.headers.as_deref()).await?;

        let route = RequestRoute {
            api_key,
            proxy: proxy.as_ref().map(|l| l.identifier().to_string()),
            user_agent: header.as_ref().map(|l| l.identifier().to_string()),
        };

        let started = Instant::now();
        let result = self.api.fetch_page(request, &route).await;
        self.metrics.record_request_latency(started.elapsed());

        let ok = result.is_ok();
        self.release(self.proxies.as_deref(), proxy.as_ref(), ok).await;
        self.release(self.headers.as_deref(), header.as_ref(), ok).await;

        result.map_err(CoreError::from)
    }

    async fn lease(&self, pool: Option<&ResourcePool>) -> Result<Option<PoolLease>, PoolError> {
        let Some(pool) = pool else {
            return Ok(None);
        };
        let operation = format!("{} lease", pool.name());
        core_logic::with_retry_if(
            &self.pool_retry,
            &operation,
            |e: &PoolError| matches!(e, PoolError::Exhausted { .. }),
            || pool.acquire(),
        )
        .await
        .map(Some)
    }

    async fn release(&self, pool: Option<&ResourcePool>, lease: Option<&PoolLease>, ok: bool) {
        let (Some(pool), Some(lease)) = (pool, lease) else {
            return;
        };
        if ok {
            pool.report_success(lease).await;
        } else {
            debug!("{} {} failed a request", pool.name(), lease.identifier());
            pool.report_failure(lease).await;
        }
    }
}
