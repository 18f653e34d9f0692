//! # Chainbase Client
//!
//! `GET <base>/token/holders` over reqwest, optionally through a proxy.
//! One `reqwest::Client` is built per proxy URL and cached, so connection
//! pools are reused across pages and contracts.
//!
//! Classification: any 2xx is a page, anything else is
//! [`NetworkError::HttpError`] with the body's `message` when it has one.

use async_trait::async_trait;
use core_logic::config::ChainbaseConfig;
use core_logic::{
    HolderEntry, HoldersApi, HoldersPage, NetworkError, PageRequest, ResourcePool, RequestRoute,
};
use futures::stream::{self, StreamExt};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const DIRECT: &str = "direct";

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<HolderEntry>>,
    #[serde(default)]
    next_page: Option<u64>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug)]
pub struct ChainbaseClient {
    url: String,
    timeout: Duration,
    clients: RwLock<HashMap<String, reqwest::Client>>,
}

impl ChainbaseClient {
    pub fn new(config: &ChainbaseConfig) -> Self {
        Self {
            url: config.holders_url(),
            timeout: config.request_timeout(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, NetworkError> {
        let key = proxy.unwrap_or(DIRECT);
        if let Some(client) = self.clients.read().await.get(key) {
            return Ok(client.clone());
        }

        let client = build_client(proxy, self.timeout)?;
        self.clients
            .write()
            .await
            .insert(key.to_string(), client.clone());
        Ok(client)
    }
}

fn build_client(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::Client, NetworkError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| NetworkError::InvalidProxy {
            proxy: proxy_url.to_string(),
            reason: e.to_string(),
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| NetworkError::Request {
        endpoint: proxy.unwrap_or(DIRECT).to_string(),
        reason: format!("failed to build HTTP client: {}", e),
    })
}

fn classify_transport_error(e: reqwest::Error, endpoint: &str, timeout: Duration) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            endpoint: endpoint.to_string(),
        }
    } else {
        NetworkError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl HoldersApi for ChainbaseClient {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        route: &RequestRoute,
    ) -> Result<HoldersPage, NetworkError> {
        let client = self.client_for(route.proxy.as_deref()).await?;

        let mut builder = client
            .get(&self.url)
            .header("x-api-key", &route.api_key)
            .header(ACCEPT, "application/json")
            .query(&[
                ("chain_id", request.chain_id.to_string()),
                ("contract_address", request.contract_address.clone()),
                ("page", request.page.to_string()),
                ("limit", request.limit.to_string()),
            ]);
        if let Some(user_agent) = &route.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(e, &self.url, self.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(e, &self.url, self.timeout))?;

        debug!(
            "{} page {} -> HTTP {} ({} bytes)",
            request.contract_address,
            request.page,
            status,
            body.len()
        );
        parse_holders_response(status, &body, &self.url, request.limit)
    }
}

/// Classifies one upstream response. `total_pages` is only derived from a
/// positive `count`; otherwise it stays unknown.
pub fn parse_holders_response(
    status: u16,
    body: &str,
    endpoint: &str,
    limit: u32,
) -> Result<HoldersPage, NetworkError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<RawResponse>(body)
            .ok()
            .and_then(|raw| raw.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(NetworkError::HttpError {
            status_code: status,
            endpoint: endpoint.to_string(),
            message,
        });
    }

    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| NetworkError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    let total_pages = match (raw.count, limit) {
        (Some(count), limit) if count > 0 && limit > 0 => Some(count.div_ceil(limit as u64)),
        _ => None,
    };

    Ok(HoldersPage {
        code: raw.code,
        message: raw.message,
        data: raw.data.unwrap_or_default(),
        next_page: raw.next_page,
        count: raw.count,
        total_pages,
    })
}

/// Probes every proxy of `pool` with a HEAD request to `probe_url`,
/// `concurrency` at a time, and marks each working or not. Any HTTP
/// response counts as healthy. Returns `(healthy, unhealthy)`.
pub async fn probe_proxies(
    pool: &ResourcePool,
    probe_url: &str,
    timeout: Duration,
    concurrency: usize,
) -> (usize, usize) {
    let identifiers: Vec<String> = pool
        .entries()
        .await
        .into_iter()
        .map(|e| e.identifier)
        .collect();

    info!(
        "🔍 Scanning {} proxies ({} concurrent)...",
        identifiers.len(),
        concurrency
    );

    let results: Vec<(String, bool)> = stream::iter(identifiers)
        .map(|proxy| async move {
            let healthy = match build_client(Some(&proxy), timeout) {
                Ok(client) => client.head(probe_url).send().await.is_ok(),
                Err(e) => {
                    warn!("{}", e);
                    false
                }
            };
            (proxy, healthy)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut healthy_count = 0;
    let mut unhealthy_count = 0;
    for (proxy, healthy) in results {
        if healthy {
            healthy_count += 1;
        } else {
            unhealthy_count += 1;
            debug!("Proxy {} failed the probe", proxy);
        }
        if let Err(e) = pool.set_working(&proxy, healthy).await {
            warn!("{}", e);
        }
    }

    (healthy_count, unhealthy_count)
}
