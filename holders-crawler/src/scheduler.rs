use crate::engine::{CrawlEngine, CrawlReport};
use core_logic::{Contract, ParsingStatus, RESULT_TARGET};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

#[derive(Debug, Clone, PartialEq)]
pub enum ContractOutcome {
    Crawled(CrawlReport),
    /// Shutdown was requested before the contract got a worker
    NotStarted,
    /// Isolated per-contract error (configuration, storage, panic)
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractResult {
    pub contract: Contract,
    pub outcome: ContractOutcome,
}

impl ContractResult {
    pub fn new_holders(&self) -> &[String] {
        match &self.outcome {
            ContractOutcome::Crawled(report) => &report.new_holders,
            _ => &[],
        }
    }
}

/// Unfinished contracts first, each group in input order. Repeated
/// addresses keep their first occurrence.
pub fn prioritize(contracts: Vec<Contract>, unfinished: &HashSet<String>) -> Vec<Contract> {
    let mut seen = HashSet::new();
    let (resumed, fresh): (Vec<Contract>, Vec<Contract>) = contracts
        .into_iter()
        .filter(|c| {
            let first = seen.insert(c.address.clone());
            if !first {
                warn!("Duplicate contract {} ignored", c);
            }
            first
        })
        .partition(|c| unfinished.contains(&c.address));
    resumed.into_iter().chain(fresh).collect()
}

pub struct Scheduler {
    engine: Arc<CrawlEngine>,
    max_workers: usize,
}

impl Scheduler {
    pub fn new(engine: Arc<CrawlEngine>, max_workers: usize) -> Self {
        Self {
            engine,
            max_workers: max_workers.max(1),
        }
    }

    /// Crawls `contracts` with at most `max_workers` running at once.
    /// Results come back in scheduled order (resumed contracts first); one
    /// contract's failure never stops the others.
    pub async fn run(
        &self,
        contracts: Vec<Contract>,
        cancel: &CancellationToken,
    ) -> Vec<ContractResult> {
        let unfinished: HashSet<String> = match self.engine.store().list_unfinished_contracts().await
        {
            Ok(list) => list.into_iter().collect(),
            Err(e) => {
                warn!("Could not read unfinished contracts, keeping input order: {}", e);
                HashSet::new()
            }
        };

        let ordered = prioritize(contracts, &unfinished);
        let resumed = ordered
            .iter()
            .filter(|c| unfinished.contains(&c.address))
            .count();
        info!(
            "Starting crawl of {} contracts ({} resumed) with {} workers...",
            ordered.len(),
            resumed,
            self.max_workers
        );

        let start_time = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();

        for (idx, contract) in ordered.iter().cloned().enumerate() {
            let engine = self.engine.clone();
            let semaphore = semaphore.clone();
            let token = cancel.clone();
            let span = tracing::info_span!("contract", address = %contract.address);

            set.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (idx, ContractOutcome::NotStarted);
                    };
                    if token.is_cancelled() {
                        return (idx, ContractOutcome::NotStarted);
                    }
                    match engine.crawl(&contract, &token).await {
                        Ok(report) => (idx, ContractOutcome::Crawled(report)),
                        Err(e) => {
                            error!(target: RESULT_TARGET, "{} FAILED: {}", contract, e);
                            (idx, ContractOutcome::Failed(e.to_string()))
                        }
                    }
                }
                .instrument(span),
            );
        }

        let mut outcomes: Vec<ContractOutcome> = vec![
            ContractOutcome::Failed("worker panicked".to_string());
            ordered.len()
        ];
        while let Some(res) = set.join_next().await {
            match res {
                Ok((idx, outcome)) => outcomes[idx] = outcome,
                Err(e) => error!("A crawl task panicked or failed to join: {:?}", e),
            }
        }

        let results: Vec<ContractResult> = ordered
            .into_iter()
            .zip(outcomes)
            .map(|(contract, outcome)| ContractResult { contract, outcome })
            .collect();

        log_summary(&results, start_time.elapsed());
        results
    }
}

fn log_summary(results: &[ContractResult], elapsed: std::time::Duration) {
    let mut completed = 0;
    let mut interrupted = 0;
    let mut failed = 0;
    let mut not_started = 0;
    for result in results {
        match &result.outcome {
            ContractOutcome::Crawled(report) => match report.status {
                ParsingStatus::Completed => completed += 1,
                ParsingStatus::Failed => failed += 1,
                _ => interrupted += 1,
            },
            ContractOutcome::NotStarted => not_started += 1,
            ContractOutcome::Failed(_) => failed += 1,
        }
    }
    let new_holders: usize = results.iter().map(|r| r.new_holders().len()).sum();

    info!(
        target: RESULT_TARGET,
        "Total Time: {:.1}s | COMPLETED: {} | FAILED: {} | Interrupted: {} | Not started: {} | New holders: {}",
        elapsed.as_secs_f64(),
        completed,
        failed,
        interrupted,
        not_started,
        new_holders
    );
}
