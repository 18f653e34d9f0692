#![allow(dead_code)]

use async_trait::async_trait;
use core_logic::{
    ChainRegistry, CheckpointStore, CrawlMetrics, CredentialPool, HolderEntry, HoldersApi,
    HoldersPage, NetworkError, PageRequest, RequestGate, RequestRoute, ResourcePool,
};
use holders_crawler::{CrawlEngine, RequestExecutor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn page(addresses: &[&str], next_page: Option<u64>) -> Result<HoldersPage, NetworkError> {
    Ok(HoldersPage {
        code: Some(0),
        message: Some("ok".to_string()),
        data: addresses
            .iter()
            .map(|a| HolderEntry::Address(a.to_string()))
            .collect(),
        next_page,
        count: None,
        total_pages: None,
    })
}

pub fn http_error(status_code: u16, message: &str) -> Result<HoldersPage, NetworkError> {
    Err(NetworkError::HttpError {
        status_code,
        endpoint: "fake".to_string(),
        message: message.to_string(),
    })
}

/// Upstream scripted per `(contract, page)`; unscripted pages answer 404
#[derive(Default)]
pub struct FakeApi {
    pages: Mutex<HashMap<(String, u64), Result<HoldersPage, NetworkError>>>,
    calls: Mutex<Vec<(String, u64, RequestRoute)>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(&self, contract: &str, page: u64, response: Result<HoldersPage, NetworkError>) {
        self.pages
            .lock()
            .unwrap()
            .insert((contract.to_string(), page), response);
    }

    /// Pages requested for `contract`, in order
    pub fn pages_requested(&self, contract: &str) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| c == contract)
            .map(|(_, p, _)| *p)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn routes(&self) -> Vec<RequestRoute> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, r)| r.clone())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HoldersApi for FakeApi {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        route: &RequestRoute,
    ) -> Result<HoldersPage, NetworkError> {
        self.calls.lock().unwrap().push((
            request.contract_address.clone(),
            request.page,
            route.clone(),
        ));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pages
            .lock()
            .unwrap()
            .get(&(request.contract_address.clone(), request.page))
            .cloned()
            .unwrap_or_else(|| http_error(404, "page not scripted"))
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub api: Arc<FakeApi>,
    pub store: Arc<CheckpointStore>,
    pub metrics: Arc<CrawlMetrics>,
    pub engine: Arc<CrawlEngine>,
}

pub struct HarnessOptions {
    pub api: FakeApi,
    pub max_in_flight: usize,
    pub proxies: Option<Arc<ResourcePool>>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            api: FakeApi::new(),
            max_in_flight: 5,
            proxies: None,
        }
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(HarnessOptions::default()).await
    }

    pub async fn with_options(options: HarnessOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(options.api);
        let store = Arc::new(CheckpointStore::open(dir.path().join("db")).await.unwrap());
        let metrics = Arc::new(CrawlMetrics::default());
        let credentials =
            Arc::new(CredentialPool::new(vec!["key-a".to_string(), "key-b".to_string()]).unwrap());

        let mut executor = RequestExecutor::new(
            api.clone(),
            RequestGate::new(options.max_in_flight, None),
            credentials,
            metrics.clone(),
        )
        .with_pool_retry(1, 10);
        if let Some(proxies) = options.proxies {
            executor = executor.with_proxies(proxies);
        }

        let engine = Arc::new(CrawlEngine::new(
            store.clone(),
            Arc::new(executor),
            ChainRegistry::default(),
            metrics.clone(),
        ));

        Self {
            dir,
            api,
            store,
            metrics,
            engine,
        }
    }
}
