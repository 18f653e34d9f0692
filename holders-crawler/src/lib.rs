//! # Holders Crawler
//!
//! Resumable crawl of token holder lists from the Chainbase API. The engine
//! pages through one contract at a time, checkpointing every page; the
//! scheduler fans contracts out over a bounded set of workers.

pub mod client;
pub mod config;
pub mod engine;
pub mod executor;
pub mod runtime;
pub mod scheduler;

pub use client::{parse_holders_response, probe_proxies, ChainbaseClient};
pub use engine::{CrawlEngine, CrawlReport};
pub use executor::RequestExecutor;
pub use runtime::Runtime;
pub use scheduler::{prioritize, ContractOutcome, ContractResult, Scheduler};
