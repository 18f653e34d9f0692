//! # Crawl Engine
//!
//! Per-contract pagination state machine:
//!
//! ```text
//! NOT_STARTED -> IN_PROGRESS -> COMPLETED
//!                     |  ^
//!                     v  |
//!                   FAILED   (resumed from its recorded page)
//! ```
//!
//! Every fetched page is checkpointed before the cursor moves on: holders
//! first, then the progress record pointing at the next page to fetch. A
//! crash between the two re-fetches one page and the merge drops the repeats.

use crate::executor::RequestExecutor;
use core_logic::{
    ChainRegistry, CheckpointStore, ConfigError, Contract, CoreError, CrawlMetrics, Holder,
    NetworkError, PageRequest, ParsingProgress, ParsingStatus, ProcessedContract, RESULT_TARGET,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    /// Status persisted when the run ended
    pub status: ParsingStatus,
    pub pages_fetched: u64,
    /// Addresses first seen during this run, in page order
    pub new_holders: Vec<String>,
    /// The contract was already COMPLETED; nothing was fetched
    pub skipped: bool,
    pub error: Option<String>,
}

impl CrawlReport {
    fn already_completed() -> Self {
        Self {
            status: ParsingStatus::Completed,
            pages_fetched: 0,
            new_holders: Vec::new(),
            skipped: true,
            error: None,
        }
    }
}

enum LoopExit {
    LastPage,
    Cancelled,
    Failed(String),
}

pub struct CrawlEngine {
    store: Arc<CheckpointStore>,
    executor: Arc<RequestExecutor>,
    chains: ChainRegistry,
    metrics: Arc<CrawlMetrics>,
    page_limit: u32,
    start_page: u64,
}

impl CrawlEngine {
    pub fn new(
        store: Arc<CheckpointStore>,
        executor: Arc<RequestExecutor>,
        chains: ChainRegistry,
        metrics: Arc<CrawlMetrics>,
    ) -> Self {
        Self {
            store,
            executor,
            chains,
            metrics,
            page_limit: 100,
            start_page: 1,
        }
    }

    pub fn with_paging(mut self, page_limit: u32, start_page: u64) -> Self {
        self.page_limit = page_limit;
        self.start_page = start_page;
        self
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    /// Fetches every remaining page of `contract`.
    ///
    /// An unfinished progress record, FAILED included, resumes at its
    /// recorded page instead of restarting at page 1.
    ///
    /// Upstream and pool failures end the run with a FAILED checkpoint and
    /// an `Ok` report; `Err` is reserved for configuration problems (unknown
    /// chain, before any network call or write) and processed-contract
    /// write failures.
    pub async fn crawl(
        &self,
        contract: &Contract,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, CoreError> {
        let address = contract.address.as_str();

        let existing = self.store.get_processed_contract(address).await?;
        if existing
            .as_ref()
            .is_some_and(|c| c.status == ParsingStatus::Completed)
        {
            if self.store.get_progress(address).await?.is_some() {
                debug!("Clearing leftover progress of completed {}", contract);
                self.store.remove_progress(address).await;
            }
            info!(
                target: RESULT_TARGET,
                "{} already COMPLETED, skipping", contract
            );
            return Ok(CrawlReport::already_completed());
        }

        let chain_id = self
            .chains
            .resolve(&contract.chain)
            .ok_or_else(|| ConfigError::UnknownChain {
                chain: contract.chain.clone(),
            })?;

        let mut known: HashSet<String> = existing
            .as_ref()
            .map(|c| c.holders.iter().map(|h| h.address.clone()).collect())
            .unwrap_or_default();
        let has_record = existing.is_some();

        let progress = self.store.get_progress(address).await?;
        let (mut page, mut total_pages) = match &progress {
            Some(p) if p.status.is_unfinished() => {
                info!(
                    "Resuming {} from page {} (was {})",
                    contract, p.current_page, p.status
                );
                (p.current_page, p.total_pages)
            }
            _ => (self.start_page, None),
        };

        let mut pages_fetched = 0u64;
        let mut visited: HashSet<u64> = HashSet::new();
        let mut new_holders = Vec::new();

        let exit = loop {
            if cancel.is_cancelled() {
                break LoopExit::Cancelled;
            }

            let request = PageRequest {
                chain_id,
                contract_address: contract.address.clone(),
                page,
                limit: self.page_limit,
            };
            debug!("Fetching page {} of {}", page, contract);

            let response = match self.executor.execute(&request).await {
                Ok(response) => response,
                Err(e) => {
                    self.metrics.record_page_failure();
                    break LoopExit::Failed(e.to_string());
                }
            };

            let fresh: Vec<Holder> = response
                .data
                .iter()
                .filter(|entry| !entry.address().is_empty())
                .filter(|entry| known.insert(entry.address().to_string()))
                .map(|entry| {
                    Holder::with_balance(
                        entry.address(),
                        entry.balance().unwrap_or_else(|| "0".to_string()),
                    )
                })
                .collect();

            if response.total_pages.is_some() {
                total_pages = response.total_pages;
            }
            pages_fetched += 1;
            visited.insert(page);
            self.metrics.record_page(fresh.len());
            new_holders.extend(fresh.iter().map(|h| h.address.clone()));

            self.store
                .save_processed_contract(ProcessedContract::new(
                    contract,
                    fresh.clone(),
                    ParsingStatus::InProgress,
                ))
                .await?;
            self.store.add_pending_holders(address, fresh).await;

            let next_page = match response.next_page {
                None => break LoopExit::LastPage,
                Some(next) if visited.contains(&next) => {
                    let error = NetworkError::InvalidResponse {
                        endpoint: format!("page {}", page),
                        reason: format!("next_page {} was already fetched this run", next),
                    };
                    break LoopExit::Failed(error.to_string());
                }
                Some(next) => next,
            };

            self.store
                .save_progress(
                    ParsingProgress::new(address, next_page, ParsingStatus::InProgress)
                        .with_total_pages(total_pages),
                )
                .await;
            page = next_page;
        };

        let report = |status, error| CrawlReport {
            status,
            pages_fetched,
            new_holders: new_holders.clone(),
            skipped: false,
            error,
        };

        match exit {
            LoopExit::LastPage => {
                let saved = self
                    .store
                    .save_processed_contract(ProcessedContract::new(
                        contract,
                        Vec::new(),
                        ParsingStatus::Completed,
                    ))
                    .await?;
                self.metrics.record_contract_completed();
                info!(
                    target: RESULT_TARGET,
                    "{} COMPLETED: {} pages, {} new holders, {} total",
                    contract,
                    pages_fetched,
                    new_holders.len(),
                    saved.holders_count
                );
                Ok(report(ParsingStatus::Completed, None))
            }
            LoopExit::Cancelled => {
                self.store
                    .save_progress(
                        ParsingProgress::new(address, page, ParsingStatus::InProgress)
                            .with_total_pages(total_pages),
                    )
                    .await;
                self.metrics.record_contract_interrupted();
                info!(
                    target: RESULT_TARGET,
                    "{} IN_PROGRESS: interrupted before page {} ({} pages this run)",
                    contract,
                    page,
                    pages_fetched
                );
                Ok(report(ParsingStatus::InProgress, None))
            }
            LoopExit::Failed(message) => {
                self.store
                    .save_progress(
                        ParsingProgress::new(address, page, ParsingStatus::Failed)
                            .with_total_pages(total_pages)
                            .with_error(message.clone()),
                    )
                    .await;
                if has_record || pages_fetched > 0 {
                    self.store
                        .save_processed_contract(ProcessedContract::new(
                            contract,
                            Vec::new(),
                            ParsingStatus::Failed,
                        ))
                        .await?;
                }
                self.metrics.record_contract_failed();
                warn!(
                    target: RESULT_TARGET,
                    "{} FAILED at page {}: {}", contract, page, message
                );
                Ok(report(ParsingStatus::Failed, Some(message)))
            }
        }
    }
}
