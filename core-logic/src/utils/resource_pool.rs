//! # Resource Pool
//!
//! Round-robin rotation over proxies (or header identities) with per-entry
//! health tracking. An entry that keeps failing is disabled for a cooldown
//! window; an entry that hits its request quota is rested for the same window.
//!
//! All state lives behind one async mutex, and the full pool is snapshotted
//! to disk after every mutation while that mutex is held, so a restart keeps
//! fail counts and cooldown windows.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::models::PoolEntry;
use crate::utils::json_file::JsonFile;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Snapshot = BTreeMap<String, PoolEntry>;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub cooldown: Duration,
    pub max_fails: u32,
    pub max_requests_per_entry: u32,
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            max_fails: config.max_fails,
            max_requests_per_entry: config.max_requests_per_entry,
        }
    }
}

/// Handle to the entry picked for one call; hand it back via
/// [`ResourcePool::report_success`] or [`ResourcePool::report_failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLease {
    index: usize,
    identifier: String,
}

impl PoolLease {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[derive(Debug)]
struct PoolState {
    entries: Vec<PoolEntry>,
    last_index: Option<usize>,
}

#[derive(Debug)]
pub struct ResourcePool {
    name: String,
    settings: PoolSettings,
    size: usize,
    snapshot: Option<JsonFile<Snapshot>>,
    state: Mutex<PoolState>,
}

impl ResourcePool {
    /// In-memory pool over `identifiers` (duplicates dropped, order kept)
    pub fn new(name: &str, identifiers: Vec<String>, settings: PoolSettings) -> Self {
        let mut seen = HashSet::new();
        let entries: Vec<PoolEntry> = identifiers
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .map(PoolEntry::new)
            .collect();

        Self {
            name: name.to_string(),
            settings,
            size: entries.len(),
            snapshot: None,
            state: Mutex::new(PoolState {
                entries,
                last_index: None,
            }),
        }
    }

    /// Pool backed by a snapshot file. Entries found in the snapshot resume
    /// their recorded health; snapshot entries missing from `identifiers`
    /// are dropped. An unreadable snapshot is logged and replaced.
    pub async fn open(
        name: &str,
        identifiers: Vec<String>,
        settings: PoolSettings,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        let mut pool = Self::new(name, identifiers, settings);
        let file: JsonFile<Snapshot> = JsonFile::new(snapshot_path);

        match file.read().await {
            Ok(saved) => {
                let state = pool.state.get_mut();
                let mut restored = 0;
                for entry in state.entries.iter_mut() {
                    if let Some(saved_entry) = saved.get(&entry.identifier) {
                        *entry = saved_entry.clone();
                        restored += 1;
                    }
                }
                info!(
                    "{} pool: restored state for {}/{} entries from {}",
                    pool.name,
                    restored,
                    pool.size,
                    file.path().display()
                );
            }
            Err(e) => warn!(
                "{} pool: ignoring unreadable snapshot {}: {}",
                pool.name,
                file.path().display(),
                e
            ),
        }

        pool.snapshot = Some(file);
        {
            let state = pool.state.lock().await;
            pool.persist(&state).await;
        }
        pool
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Picks the next eligible entry after the last one handed out, scanning
    /// at most one full cycle. Never waits: an empty scan is
    /// [`PoolError::Exhausted`].
    pub async fn acquire(&self) -> Result<PoolLease, PoolError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let n = state.entries.len();
        let start = state.last_index.map(|i| i + 1).unwrap_or(0);
        let mut mutated = false;
        let mut picked = None;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let entry = &mut state.entries[idx];

            if entry.is_cooling_down(now) {
                continue;
            }
            if entry.cooldown_until.take().is_some() {
                mutated = true;
                if !entry.is_working {
                    entry.is_working = true;
                    info!(
                        "{} pool: {} back in rotation after cooldown",
                        self.name, entry.identifier
                    );
                }
            }
            if !entry.is_working {
                continue;
            }
            if entry.request_count >= self.settings.max_requests_per_entry {
                self.rest(entry, now);
                mutated = true;
                continue;
            }

            picked = Some(PoolLease {
                index: idx,
                identifier: entry.identifier.clone(),
            });
            break;
        }

        if let Some(lease) = &picked {
            state.last_index = Some(lease.index);
        }
        if mutated {
            self.persist(&state).await;
        }

        picked.ok_or_else(|| PoolError::Exhausted {
            pool: self.name.clone(),
        })
    }

    /// Success resets the fail streak and counts toward the request quota
    pub async fn report_success(&self, lease: &PoolLease) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(entry) = state.entries.get_mut(lease.index) {
            entry.fail_count = 0;
            entry.request_count += 1;
            entry.last_used_at = now;
            if entry.request_count >= self.settings.max_requests_per_entry {
                self.rest(entry, now);
            }
        }
        self.persist(&state).await;
    }

    /// Failure extends the fail streak; at `max_fails` the entry is disabled
    /// until its cooldown elapses
    pub async fn report_failure(&self, lease: &PoolLease) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(entry) = state.entries.get_mut(lease.index) {
            entry.fail_count += 1;
            entry.last_used_at = now;
            if entry.fail_count >= self.settings.max_fails && entry.is_working {
                entry.is_working = false;
                entry.cooldown_until = Some(now + self.cooldown());
                warn!(
                    "{} pool: disabling {} after {} failures (cooldown {:?})",
                    self.name, entry.identifier, entry.fail_count, self.settings.cooldown
                );
            }
        }
        self.persist(&state).await;
    }

    /// Marks an entry working or not (proxy probing). Disabling also starts
    /// a cooldown so the entry is retried later.
    pub async fn set_working(&self, identifier: &str, working: bool) -> Result<(), PoolError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let cooldown = self.cooldown();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.identifier == identifier)
            .ok_or_else(|| PoolError::UnknownEntry {
                pool: self.name.clone(),
                identifier: identifier.to_string(),
            })?;

        entry.is_working = working;
        entry.cooldown_until = if working { None } else { Some(now + cooldown) };
        self.persist(&state).await;
        Ok(())
    }

    /// Copy of every entry, in rotation order
    pub async fn entries(&self) -> Vec<PoolEntry> {
        self.state.lock().await.entries.clone()
    }

    /// Entries that would be eligible right now
    pub async fn available_count(&self) -> usize {
        let now = Utc::now();
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| {
                let cooled = !e.is_cooling_down(now);
                let usable = e.is_working || e.cooldown_until.is_some();
                cooled && usable && e.request_count < self.settings.max_requests_per_entry
            })
            .count()
    }

    /// Quota rest: cooldown with the request counter cleared, fail streak untouched
    fn rest(&self, entry: &mut PoolEntry, now: DateTime<Utc>) {
        entry.cooldown_until = Some(now + self.cooldown());
        entry.request_count = 0;
        debug!(
            "{} pool: {} reached {} requests, resting for {:?}",
            self.name, entry.identifier, self.settings.max_requests_per_entry, self.settings.cooldown
        );
    }

    fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.settings.cooldown.as_millis() as i64)
    }

    /// Snapshot failures are logged and swallowed; the next mutation retries
    async fn persist(&self, state: &PoolState) {
        let Some(file) = &self.snapshot else {
            return;
        };
        let snapshot: Snapshot = state
            .entries
            .iter()
            .map(|e| (e.identifier.clone(), e.clone()))
            .collect();
        if let Err(e) = file.replace(&snapshot).await {
            warn!("{} pool: failed to save snapshot: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_fails: u32, max_requests: u32, cooldown_ms: u64) -> PoolSettings {
        PoolSettings {
            cooldown: Duration::from_millis(cooldown_ms),
            max_fails,
            max_requests_per_entry: max_requests,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        let pool = ResourcePool::new("proxy", ids(&["a", "b", "c"]), settings(3, 100, 1000));
        let mut picked = Vec::new();
        for _ in 0..4 {
            picked.push(pool.acquire().await.unwrap().identifier().to_string());
        }
        assert_eq!(picked, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let pool = ResourcePool::new("proxy", ids(&["a", "a", "b"]), settings(3, 100, 1000));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let pool = ResourcePool::new("proxy", Vec::new(), settings(3, 100, 1000));
        assert_eq!(
            pool.acquire().await,
            Err(PoolError::Exhausted {
                pool: "proxy".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_failing_entry_is_skipped() {
        let pool = ResourcePool::new("proxy", ids(&["a", "b"]), settings(2, 100, 60_000));
        let a = pool.acquire().await.unwrap();
        pool.report_failure(&a).await;
        pool.report_failure(&a).await;

        for _ in 0..3 {
            assert_eq!(pool.acquire().await.unwrap().identifier(), "b");
        }
        let entries = pool.entries().await;
        assert!(!entries[0].is_working);
        assert!(entries[0].cooldown_until.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_fail_streak() {
        let pool = ResourcePool::new("proxy", ids(&["a"]), settings(3, 100, 60_000));
        let a = pool.acquire().await.unwrap();
        pool.report_failure(&a).await;
        pool.report_failure(&a).await;
        pool.report_success(&a).await;

        let entry = &pool.entries().await[0];
        assert_eq!(entry.fail_count, 0);
        assert_eq!(entry.request_count, 1);
        assert!(entry.is_working);
    }

    #[tokio::test]
    async fn test_quota_forces_rest_and_clears_counter() {
        let pool = ResourcePool::new("proxy", ids(&["a"]), settings(5, 2, 60_000));
        let a = pool.acquire().await.unwrap();
        pool.report_failure(&a).await;
        pool.report_success(&a).await;
        let a = pool.acquire().await.unwrap();
        pool.report_success(&a).await;

        let entry = &pool.entries().await[0];
        assert_eq!(entry.request_count, 0);
        assert!(entry.is_working);
        assert!(entry.cooldown_until.is_some());
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_set_working_unknown_entry() {
        let pool = ResourcePool::new("proxy", ids(&["a"]), settings(5, 2, 60_000));
        assert!(matches!(
            pool.set_working("zzz", false).await,
            Err(PoolError::UnknownEntry { .. })
        ));
        pool.set_working("a", false).await.unwrap();
        assert_eq!(pool.available_count().await, 0);
    }
}
