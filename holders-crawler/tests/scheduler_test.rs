mod common;

use common::{http_error, page, FakeApi, Harness, HarnessOptions};
use core_logic::{Contract, ParsingProgress, ParsingStatus};
use holders_crawler::{ContractOutcome, Scheduler};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn addresses(results: &[holders_crawler::ContractResult]) -> Vec<&str> {
    results.iter().map(|r| r.contract.address.as_str()).collect()
}

#[tokio::test]
async fn test_unfinished_contracts_run_first_and_keep_their_results() {
    let h = Harness::new().await;
    for (contract, holder) in [("0xA", "0x1"), ("0xB", "0x2"), ("0xC", "0x3")] {
        h.api.script(contract, 1, page(&[holder], None));
    }
    h.api.script("0xC", 4, page(&["0x4"], None));
    h.store
        .save_progress(ParsingProgress::new("0xC", 4, ParsingStatus::InProgress))
        .await;

    let contracts = vec![
        Contract::new("0xA", "ethereum"),
        Contract::new("0xB", "bsc"),
        Contract::new("0xC", "polygon"),
    ];
    let results = Scheduler::new(h.engine.clone(), 2)
        .run(contracts, &CancellationToken::new())
        .await;

    assert_eq!(addresses(&results), vec!["0xC", "0xA", "0xB"]);
    assert_eq!(results[0].new_holders(), ["0x4".to_string()]);
    assert_eq!(results[1].new_holders(), ["0x1".to_string()]);
    assert_eq!(results[2].new_holders(), ["0x2".to_string()]);
    assert_eq!(h.api.pages_requested("0xC"), vec![4]);
    assert!(h.store.list_unfinished_contracts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_one_failure_does_not_abort_the_batch() {
    let h = Harness::new().await;
    h.api.script("0xA", 1, page(&["0x1"], None));
    h.api.script("0xB", 1, http_error(500, "boom"));
    h.api.script("0xD", 1, page(&["0x4"], None));

    let contracts = vec![
        Contract::new("0xA", "ethereum"),
        Contract::new("0xB", "ethereum"),
        Contract::new("0xC", "not-a-chain"),
        Contract::new("0xD", "base"),
    ];
    let results = Scheduler::new(h.engine.clone(), 3)
        .run(contracts, &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 4);
    match &results[1].outcome {
        ContractOutcome::Crawled(report) => assert_eq!(report.status, ParsingStatus::Failed),
        other => panic!("expected a failed crawl, got {:?}", other),
    }
    assert!(matches!(results[2].outcome, ContractOutcome::Failed(_)));
    for idx in [0, 3] {
        match &results[idx].outcome {
            ContractOutcome::Crawled(report) => {
                assert_eq!(report.status, ParsingStatus::Completed)
            }
            other => panic!("expected a completed crawl, got {:?}", other),
        }
    }
    assert_eq!(h.store.list_unfinished_contracts().await.unwrap(), vec!["0xB"]);
}

#[tokio::test]
async fn test_worker_count_bounds_parallelism() {
    let h = Harness::with_options(HarnessOptions {
        api: FakeApi::with_delay(Duration::from_millis(30)),
        max_in_flight: 10,
        ..HarnessOptions::default()
    })
    .await;

    let contracts: Vec<Contract> = (0..6)
        .map(|i| {
            let address = format!("0x{}", i);
            h.api.script(&address, 1, page(&["0xholder"], None));
            Contract::new(address, "ethereum")
        })
        .collect();

    let results = Scheduler::new(h.engine.clone(), 2)
        .run(contracts, &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 6);
    assert_eq!(h.api.call_count(), 6);
    assert!(h.api.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_request_gate_caps_in_flight_calls_across_workers() {
    let h = Harness::with_options(HarnessOptions {
        api: FakeApi::with_delay(Duration::from_millis(30)),
        max_in_flight: 1,
        ..HarnessOptions::default()
    })
    .await;

    let contracts: Vec<Contract> = (0..4)
        .map(|i| {
            let address = format!("0x{}", i);
            h.api.script(&address, 1, page(&["0xholder"], None));
            Contract::new(address, "ethereum")
        })
        .collect();

    Scheduler::new(h.engine.clone(), 4)
        .run(contracts, &CancellationToken::new())
        .await;

    assert_eq!(h.api.call_count(), 4);
    assert_eq!(h.api.max_in_flight(), 1);
}

#[tokio::test]
async fn test_cancelled_batch_starts_nothing() {
    let h = Harness::new().await;
    h.api.script("0xA", 1, page(&["0x1"], None));
    let token = CancellationToken::new();
    token.cancel();

    let results = Scheduler::new(h.engine.clone(), 2)
        .run(vec![Contract::new("0xA", "ethereum")], &token)
        .await;

    assert_eq!(results[0].outcome, ContractOutcome::NotStarted);
    assert_eq!(h.api.call_count(), 0);
    assert!(h.store.get_progress("0xA").await.unwrap().is_none());
}
