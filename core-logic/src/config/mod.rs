use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level crawler configuration. Every section falls back to its defaults,
/// so an empty TOML file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub chainbase: ChainbaseConfig,
    #[serde(deserialize_with = "deserialize_proxy_pool")]
    pub proxy_pool: PoolConfig,
    #[serde(deserialize_with = "deserialize_header_pool")]
    pub header_pool: PoolConfig,
    pub threads: ThreadConfig,
    pub paths: PathsConfig,
    /// Extra `name -> chain id` entries merged over the built-in mapping
    pub chains: HashMap<String, u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            chainbase: ChainbaseConfig::default(),
            proxy_pool: PoolConfig::proxies(),
            header_pool: PoolConfig::headers(),
            threads: ThreadConfig::default(),
            paths: PathsConfig::default(),
            chains: HashMap::new(),
        }
    }
}

impl CrawlerConfig {
    /// Rejects values that would stall the crawl: zero workers, zero
    /// in-flight slots, an empty page size or a pool quota of zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("chainbase.default_limit", self.chainbase.default_limit as u64),
            ("chainbase.start_page", self.chainbase.start_page),
            (
                "chainbase.max_concurrent_requests",
                self.chainbase.max_concurrent_requests as u64,
            ),
            ("threads.max_workers", self.threads.max_workers as u64),
            (
                "proxy_pool.max_requests_per_entry",
                self.proxy_pool.max_requests_per_entry as u64,
            ),
            (
                "header_pool.max_requests_per_entry",
                self.header_pool.max_requests_per_entry as u64,
            ),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.chainbase.requests_per_second == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "chainbase.requests_per_second".to_string(),
                reason: "omit it to disable pacing".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainbaseConfig {
    pub base_url: String,
    pub holders_endpoint: String,
    pub default_limit: u32,
    pub start_page: u64,
    /// Maximum in-flight upstream calls across the whole crawl
    pub max_concurrent_requests: usize,
    pub requests_per_second: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for ChainbaseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.chainbase.online/v1".to_string(),
            holders_endpoint: "/token/holders".to_string(),
            default_limit: 100,
            start_page: 1,
            max_concurrent_requests: 5,
            requests_per_second: None,
            request_timeout_secs: 30,
        }
    }
}

impl ChainbaseConfig {
    pub fn holders_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.holders_endpoint.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Health thresholds for one rotating pool (proxies or header identities)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolConfig {
    pub cooldown_secs: u64,
    pub max_fails: u32,
    pub max_requests_per_entry: u32,
    pub data_file: PathBuf,
}

/// Partially specified pool section; missing keys keep the pool's own defaults
#[derive(Debug, Default, Deserialize)]
struct PoolOverrides {
    cooldown_secs: Option<u64>,
    max_fails: Option<u32>,
    max_requests_per_entry: Option<u32>,
    data_file: Option<PathBuf>,
}

impl PoolOverrides {
    fn apply(self, base: PoolConfig) -> PoolConfig {
        PoolConfig {
            cooldown_secs: self.cooldown_secs.unwrap_or(base.cooldown_secs),
            max_fails: self.max_fails.unwrap_or(base.max_fails),
            max_requests_per_entry: self
                .max_requests_per_entry
                .unwrap_or(base.max_requests_per_entry),
            data_file: self.data_file.unwrap_or(base.data_file),
        }
    }
}

fn deserialize_proxy_pool<'de, D>(deserializer: D) -> Result<PoolConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(PoolOverrides::deserialize(deserializer)?.apply(PoolConfig::proxies()))
}

fn deserialize_header_pool<'de, D>(deserializer: D) -> Result<PoolConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(PoolOverrides::deserialize(deserializer)?.apply(PoolConfig::headers()))
}

impl PoolConfig {
    pub fn proxies() -> Self {
        Self {
            cooldown_secs: 120,
            max_fails: 20,
            max_requests_per_entry: 200,
            data_file: PathBuf::from(".scratch/proxies_data.json"),
        }
    }

    pub fn headers() -> Self {
        Self {
            cooldown_secs: 300,
            max_fails: 10,
            max_requests_per_entry: 50,
            data_file: PathBuf::from(".scratch/headers_data.json"),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub max_workers: usize,
    pub pool_retry_attempts: u32,
    pub pool_retry_delay_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            pool_retry_attempts: 3,
            pool_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub contracts_file: PathBuf,
    pub api_keys_file: PathBuf,
    pub proxies_file: PathBuf,
    pub user_agents_file: Option<PathBuf>,
    pub db_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            contracts_file: PathBuf::from("contracts.txt"),
            api_keys_file: PathBuf::from("config/chainbase_api_keys.txt"),
            proxies_file: PathBuf::from("config/proxies.txt"),
            user_agents_file: None,
            db_dir: PathBuf::from("db"),
        }
    }
}

const BUILTIN_CHAINS: &[(&str, u64)] = &[
    ("ethereum", 1),
    ("polygon", 137),
    ("bsc", 56),
    ("avalanche", 43114),
    ("arbitrum", 42161),
    ("optimism", 10),
    ("base", 8453),
    ("zksync", 324),
    ("merlin", 4200),
];

/// Static `chain name -> numeric chain id` mapping
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    ids: HashMap<String, u64>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self {
            ids: BUILTIN_CHAINS
                .iter()
                .map(|(name, id)| (name.to_string(), *id))
                .collect(),
        }
    }
}

impl ChainRegistry {
    /// Built-in mapping extended (or overridden) by `extra`
    pub fn with_extra(extra: &HashMap<String, u64>) -> Self {
        let mut registry = Self::default();
        for (name, id) in extra {
            registry.ids.insert(name.to_lowercase(), *id);
        }
        registry
    }

    /// Case-insensitive lookup; `None` means the chain is unsupported
    pub fn resolve(&self, chain: &str) -> Option<u64> {
        let id = self.ids.get(&chain.trim().to_lowercase()).copied();
        if id.is_none() {
            warn!(
                "Unsupported chain: {}. Supported: {}",
                chain,
                self.names().join(", ")
            );
        }
        id
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ids.keys().cloned().collect();
        names.sort();
        names
    }
}
