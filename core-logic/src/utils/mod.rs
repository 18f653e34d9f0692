//! # Utilities Module
//!
//! Internal utility modules for the core-logic crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod credential_pool;
pub(crate) mod json_file;
pub(crate) mod list_loader;
pub(crate) mod logger;
pub(crate) mod rate_limiter;
pub(crate) mod resource_pool;
pub(crate) mod retry;
pub(crate) mod runner;

// Selective exports - only public utilities
pub use credential_pool::{mask_key, CredentialPool};
pub use list_loader::{
    load_contracts, load_credentials, load_list, load_proxies, load_user_agents, normalize_proxy,
};
pub use logger::{setup_logger, RESULT_TARGET};
pub use rate_limiter::{RequestGate, TokenBucket};
pub use resource_pool::{PoolLease, PoolSettings, ResourcePool};
pub use runner::shutdown_token;
