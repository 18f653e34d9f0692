use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_secs: f64,
    pub pages: PageMetrics,
    pub contracts: ContractMetrics,
    pub requests: RequestMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMetrics {
    pub fetched: u64,
    pub failed: u64,
    pub holders_discovered: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractMetrics {
    pub completed: u64,
    pub failed: u64,
    pub interrupted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub total_calls: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

#[derive(Debug)]
pub struct CrawlMetrics {
    pages_fetched: AtomicU64,
    pages_failed: AtomicU64,
    holders_discovered: AtomicU64,
    contracts_completed: AtomicU64,
    contracts_failed: AtomicU64,
    contracts_interrupted: AtomicU64,
    request_calls: AtomicU64,
    request_latency_sum_ms: AtomicU64,
    request_min_latency_ms: AtomicU64,
    request_max_latency_ms: AtomicU64,
    start_time: Instant,
}

impl Default for CrawlMetrics {
    fn default() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            holders_discovered: AtomicU64::new(0),
            contracts_completed: AtomicU64::new(0),
            contracts_failed: AtomicU64::new(0),
            contracts_interrupted: AtomicU64::new(0),
            request_calls: AtomicU64::new(0),
            request_latency_sum_ms: AtomicU64::new(0),
            request_min_latency_ms: AtomicU64::new(u64::MAX),
            request_max_latency_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl CrawlMetrics {
    pub fn record_page(&self, new_holders: usize) {
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        self.holders_discovered
            .fetch_add(new_holders as u64, Ordering::SeqCst);
    }

    pub fn record_page_failure(&self) {
        self.pages_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_contract_completed(&self) {
        self.contracts_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_contract_failed(&self) {
        self.contracts_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_contract_interrupted(&self) {
        self.contracts_interrupted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_request_latency(&self, latency: Duration) {
        let latency_ms = latency.as_millis() as u64;
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        self.request_latency_sum_ms
            .fetch_add(latency_ms, Ordering::SeqCst);
        self.request_min_latency_ms
            .fetch_min(latency_ms, Ordering::SeqCst);
        self.request_max_latency_ms
            .fetch_max(latency_ms, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let calls = self.request_calls.load(Ordering::SeqCst);
        let latency_sum = self.request_latency_sum_ms.load(Ordering::SeqCst);
        let min_latency = self.request_min_latency_ms.load(Ordering::SeqCst);

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
            pages: PageMetrics {
                fetched: self.pages_fetched.load(Ordering::SeqCst),
                failed: self.pages_failed.load(Ordering::SeqCst),
                holders_discovered: self.holders_discovered.load(Ordering::SeqCst),
            },
            contracts: ContractMetrics {
                completed: self.contracts_completed.load(Ordering::SeqCst),
                failed: self.contracts_failed.load(Ordering::SeqCst),
                interrupted: self.contracts_interrupted.load(Ordering::SeqCst),
            },
            requests: RequestMetrics {
                total_calls: calls,
                avg_latency_ms: if calls > 0 {
                    latency_sum as f64 / calls as f64
                } else {
                    0.0
                },
                min_latency_ms: if min_latency == u64::MAX { 0 } else { min_latency },
                max_latency_ms: self.request_max_latency_ms.load(Ordering::SeqCst),
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn export_to_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.to_json()).await
    }
}
