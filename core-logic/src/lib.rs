//! # Core Logic - Resumable Holder Crawl Building Blocks
//!
//! Everything the crawler needs apart from the HTTP client and the engine
//! itself: the persisted data model, the checkpoint store, the rotating
//! credential and proxy pools, request admission control, and logging.
//!
//! ## Modules
//!
//! - [`checkpoint`] - File-backed progress, processed-contract and pending-holder records
//! - [`config`] - Crawler configuration and the chain registry
//! - [`error`] - Typed error handling with thiserror
//! - [`metrics`] - Crawl counters and request latency
//! - [`models`] - Persisted records
//! - [`traits`] - The upstream holder-list seam
//! - [`utils`] - Pools, gate, list loaders, logger, retry

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod traits;
pub(crate) mod utils;

pub use checkpoint::CheckpointStore;
pub use config::{
    ChainRegistry, ChainbaseConfig, CrawlerConfig, PathsConfig, PoolConfig, ThreadConfig,
};
pub use error::{ConfigError, CoreError, NetworkError, PoolError, StorageError};
pub use metrics::{CrawlMetrics, MetricsSnapshot};
pub use models::{
    merge_holders, Contract, Holder, ParsingProgress, ParsingStatus, PoolEntry, ProcessedContract,
};
pub use traits::{HolderEntry, HoldersApi, HoldersPage, PageRequest, RequestRoute};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{
    load_contracts, load_credentials, load_list, load_proxies, load_user_agents, mask_key,
    normalize_proxy, setup_logger, shutdown_token, CredentialPool, PoolLease, PoolSettings,
    RequestGate, ResourcePool, TokenBucket, RESULT_TARGET,
};

// Export retry utilities for the executor and tests
pub use utils::retry::{with_retry_if, RetryConfig};
