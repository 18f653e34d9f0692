use crate::engine::CrawlEngine;
use crate::executor::RequestExecutor;
use crate::scheduler::Scheduler;
use anyhow::{Context, Result};
use core_logic::{
    load_proxies, load_user_agents, ChainRegistry, CheckpointStore, CrawlMetrics, CrawlerConfig,
    CredentialPool, HoldersApi, PoolSettings, RequestGate, ResourcePool,
};
use std::sync::Arc;
use tracing::info;

/// Every long-lived component of a crawl, wired from one configuration
pub struct Runtime {
    pub config: CrawlerConfig,
    pub store: Arc<CheckpointStore>,
    pub proxies: Arc<ResourcePool>,
    pub headers: Option<Arc<ResourcePool>>,
    pub metrics: Arc<CrawlMetrics>,
    pub engine: Arc<CrawlEngine>,
}

impl Runtime {
    /// Loads credentials, proxies and pool snapshots and opens the checkpoint
    /// store. A missing or empty credential file fails here, before any
    /// contract is touched.
    pub async fn build(config: CrawlerConfig, api: Arc<dyn HoldersApi>) -> Result<Self> {
        let credentials = Arc::new(
            CredentialPool::from_file(&config.paths.api_keys_file)
                .context("Failed to load Chainbase API keys")?,
        );
        info!("Loaded {} API keys", credentials.len());

        let proxies = Arc::new(open_proxy_pool(&config).await?);
        let headers = match &config.paths.user_agents_file {
            Some(path) => Some(Arc::new(
                ResourcePool::open(
                    "header",
                    load_user_agents(path)?,
                    PoolSettings::from(&config.header_pool),
                    &config.header_pool.data_file,
                )
                .await,
            )),
            None => None,
        };

        let store = Arc::new(
            CheckpointStore::open(&config.paths.db_dir)
                .await
                .context("Failed to open checkpoint store")?,
        );
        let metrics = Arc::new(CrawlMetrics::default());
        let gate = RequestGate::new(
            config.chainbase.max_concurrent_requests,
            config.chainbase.requests_per_second,
        );

        let mut executor = RequestExecutor::new(api, gate, credentials, metrics.clone())
            .with_proxies(proxies.clone())
            .with_pool_retry(
                config.threads.pool_retry_attempts,
                config.threads.pool_retry_delay_ms,
            );
        if let Some(headers) = &headers {
            executor = executor.with_headers(headers.clone());
        }
        if executor.proxies().is_none() {
            info!("No proxies configured, requests go direct");
        }

        let engine = CrawlEngine::new(
            store.clone(),
            Arc::new(executor),
            ChainRegistry::with_extra(&config.chains),
            metrics.clone(),
        )
        .with_paging(config.chainbase.default_limit, config.chainbase.start_page);

        Ok(Self {
            config,
            store,
            proxies,
            headers,
            metrics,
            engine: Arc::new(engine),
        })
    }

    pub fn scheduler(&self, workers: Option<usize>) -> Scheduler {
        Scheduler::new(
            self.engine.clone(),
            workers.unwrap_or(self.config.threads.max_workers),
        )
    }
}

/// Proxy pool from the proxy list, restored from its snapshot file
pub async fn open_proxy_pool(config: &CrawlerConfig) -> Result<ResourcePool> {
    let proxies = load_proxies(&config.paths.proxies_file)?;
    Ok(ResourcePool::open(
        "proxy",
        proxies,
        PoolSettings::from(&config.proxy_pool),
        &config.proxy_pool.data_file,
    )
    .await)
}
