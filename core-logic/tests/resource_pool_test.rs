use core_logic::{PoolEntry, PoolError, PoolSettings, ResourcePool};
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn settings(max_fails: u32, max_requests: u32, cooldown_ms: u64) -> PoolSettings {
    PoolSettings {
        cooldown: Duration::from_millis(cooldown_ms),
        max_fails,
        max_requests_per_entry: max_requests,
    }
}

fn proxies(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://10.0.0.{}:8080", i)).collect()
}

#[tokio::test]
async fn test_disabled_entry_returns_after_cooldown_with_fail_count() {
    let pool = ResourcePool::new("proxy", proxies(1), settings(3, 100, 150));

    for _ in 0..3 {
        let lease = pool.acquire().await.unwrap();
        pool.report_failure(&lease).await;
    }
    assert!(matches!(
        pool.acquire().await,
        Err(PoolError::Exhausted { .. })
    ));

    sleep(Duration::from_millis(200)).await;

    let lease = pool.acquire().await.unwrap();
    let entry = &pool.entries().await[0];
    assert!(entry.is_working);
    assert_eq!(entry.fail_count, 3);
    assert!(entry.cooldown_until.is_none());

    pool.report_success(&lease).await;
    assert_eq!(pool.entries().await[0].fail_count, 0);
}

#[tokio::test]
async fn test_exhausted_when_every_entry_is_cooling_down() {
    let pool = ResourcePool::new("proxy", proxies(3), settings(1, 100, 60_000));
    for _ in 0..3 {
        let lease = pool.acquire().await.unwrap();
        pool.report_failure(&lease).await;
    }
    assert_eq!(
        pool.acquire().await,
        Err(PoolError::Exhausted {
            pool: "proxy".to_string()
        })
    );
}

#[tokio::test]
async fn test_quota_rest_is_independent_of_failures() {
    let pool = ResourcePool::new("header", proxies(2), settings(10, 1, 60_000));

    let first = pool.acquire().await.unwrap();
    pool.report_success(&first).await;

    // Entry 0 is resting; rotation keeps serving entry 1
    let second = pool.acquire().await.unwrap();
    assert_ne!(second.identifier(), first.identifier());
    let rested = &pool.entries().await[0];
    assert_eq!(rested.request_count, 0);
    assert_eq!(rested.fail_count, 0);
    assert!(rested.is_working);
}

#[tokio::test]
async fn test_snapshot_written_after_every_mutation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".scratch").join("proxies_data.json");
    let pool = ResourcePool::open("proxy", proxies(2), settings(2, 100, 60_000), &path).await;

    let read_snapshot = || {
        let raw = std::fs::read_to_string(&path).unwrap();
        serde_json::from_str::<BTreeMap<String, PoolEntry>>(&raw).unwrap()
    };
    assert_eq!(read_snapshot().len(), 2);

    let lease = pool.acquire().await.unwrap();
    pool.report_failure(&lease).await;
    assert_eq!(read_snapshot()[lease.identifier()].fail_count, 1);

    pool.report_failure(&lease).await;
    let snapshot = read_snapshot();
    assert!(!snapshot[lease.identifier()].is_working);
    assert!(snapshot[lease.identifier()].cooldown_until.is_some());
}

#[tokio::test]
async fn test_restart_keeps_cooldown_windows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proxies_data.json");
    let ids = proxies(2);

    {
        let pool = ResourcePool::open("proxy", ids.clone(), settings(1, 100, 60_000), &path).await;
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.identifier(), ids[0]);
        pool.report_failure(&lease).await;
    }

    let pool = ResourcePool::open("proxy", ids.clone(), settings(1, 100, 60_000), &path).await;
    for _ in 0..3 {
        assert_eq!(pool.acquire().await.unwrap().identifier(), ids[1]);
    }
    assert_eq!(pool.entries().await[0].fail_count, 1);
}

#[tokio::test]
async fn test_restore_ignores_unknown_and_adds_new_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proxies_data.json");

    let mut stale = PoolEntry::new("http://gone:1");
    stale.fail_count = 7;
    let mut known = PoolEntry::new("http://10.0.0.0:8080");
    known.fail_count = 4;
    let snapshot: BTreeMap<String, PoolEntry> = [stale, known]
        .into_iter()
        .map(|e| (e.identifier.clone(), e))
        .collect();
    std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

    let pool = ResourcePool::open("proxy", proxies(2), settings(20, 100, 60_000), &path).await;
    let entries = pool.entries().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].fail_count, 4);
    assert_eq!(entries[1].fail_count, 0);
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proxies_data.json");
    std::fs::write(&path, "not json").unwrap();

    let pool = ResourcePool::open("proxy", proxies(1), settings(2, 100, 60_000), &path).await;
    assert!(pool.acquire().await.is_ok());
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(serde_json::from_str::<BTreeMap<String, PoolEntry>>(&raw).is_ok());
}

#[tokio::test]
async fn test_set_working_false_starts_cooldown() {
    let pool = ResourcePool::new("proxy", proxies(2), settings(5, 100, 100));
    pool.set_working("http://10.0.0.0:8080", false).await.unwrap();

    for _ in 0..2 {
        assert_eq!(
            pool.acquire().await.unwrap().identifier(),
            "http://10.0.0.1:8080"
        );
    }

    sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.available_count().await, 2);
}
