//! # Checkpoint Store
//!
//! Durable crawl state split over three JSON documents in one directory:
//!
//! - `processed_contracts.json`: `{"contracts": [ProcessedContract, ...]}`
//! - `pending_holders.json`: `{"pending": {address: [Holder, ...]}}`
//! - `parsing_progress.json`: `{"progress": {address: ParsingProgress}}`
//!
//! Each document has its own lock and every write is one
//! load -> merge -> atomic save critical section, so concurrent workers
//! never drop each other's holders.
//!
//! Failure policy: processed-contract writes propagate their error;
//! progress and pending writes are logged and swallowed.
//!
//! Reaching COMPLETED removes the progress record in a second write. If that
//! write is lost, the COMPLETED record still wins: the contract is not
//! listed as unfinished and the next crawl clears the leftover.

use crate::error::StorageError;
use crate::models::{merge_holders, Holder, ParsingProgress, ParsingStatus, ProcessedContract};
use crate::utils::json_file::JsonFile;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

pub const PROCESSED_FILE: &str = "processed_contracts.json";
pub const PENDING_FILE: &str = "pending_holders.json";
pub const PROGRESS_FILE: &str = "parsing_progress.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProcessedDoc {
    #[serde(default)]
    contracts: Vec<ProcessedContract>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingDoc {
    #[serde(default)]
    pending: BTreeMap<String, Vec<Holder>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressDoc {
    #[serde(default)]
    progress: BTreeMap<String, ParsingProgress>,
}

#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    processed: JsonFile<ProcessedDoc>,
    pending: JsonFile<PendingDoc>,
    progress: JsonFile<ProgressDoc>,
}

impl CheckpointStore {
    /// Opens (and if needed initializes) the store under `dir`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::Io {
                path: dir.display().to_string(),
                source,
            })?;

        let store = Self {
            processed: JsonFile::new(dir.join(PROCESSED_FILE)),
            pending: JsonFile::new(dir.join(PENDING_FILE)),
            progress: JsonFile::new(dir.join(PROGRESS_FILE)),
            dir,
        };
        store.processed.ensure_exists().await?;
        store.pending.ensure_exists().await?;
        store.progress.ensure_exists().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // --- progress ---

    /// Upserts the progress record for its contract (full overwrite)
    pub async fn save_progress(&self, record: ParsingProgress) {
        let address = record.contract_address.clone();
        let status = record.status;
        let page = record.current_page;
        let result = self
            .progress
            .update(|doc| {
                doc.progress.insert(record.contract_address.clone(), record);
            })
            .await;

        match result {
            Ok(()) => debug!("Progress {}: page {} {}", address, page, status),
            Err(e) => error!("Failed to save progress for {}: {}", address, e),
        }
    }

    pub async fn get_progress(&self, address: &str) -> Result<Option<ParsingProgress>, StorageError> {
        Ok(self.progress.read().await?.progress.get(address).cloned())
    }

    pub async fn remove_progress(&self, address: &str) {
        if let Err(e) = self
            .progress
            .update(|doc| doc.progress.remove(address))
            .await
        {
            error!("Failed to remove progress for {}: {}", address, e);
        }
    }

    /// Addresses whose progress is IN_PROGRESS or FAILED. A progress record
    /// left next to a COMPLETED processed record does not count.
    pub async fn list_unfinished_contracts(&self) -> Result<Vec<String>, StorageError> {
        let completed: HashSet<String> = self
            .processed
            .read()
            .await?
            .contracts
            .into_iter()
            .filter(|c| c.status == ParsingStatus::Completed)
            .map(|c| c.address)
            .collect();

        Ok(self
            .progress
            .read()
            .await?
            .progress
            .values()
            .filter(|p| p.status.is_unfinished())
            .filter(|p| !completed.contains(&p.contract_address))
            .map(|p| p.contract_address.clone())
            .collect())
    }

    // --- processed contracts ---

    /// Merges `record` into the stored record for the same address.
    ///
    /// Stored holders are kept verbatim and only unseen addresses are
    /// appended; `chain` and `status` come from `record`. Reaching
    /// COMPLETED also drops the contract's progress record. Returns the
    /// record as persisted.
    pub async fn save_processed_contract(
        &self,
        record: ProcessedContract,
    ) -> Result<ProcessedContract, StorageError> {
        let address = record.address.clone();
        let saved = self
            .processed
            .update(move |doc| {
                let position = doc
                    .contracts
                    .iter()
                    .position(|c| c.address == record.address);

                match position {
                    Some(idx) => {
                        let existing = &mut doc.contracts[idx];
                        merge_holders(&mut existing.holders, record.holders);
                        existing.holders_count = existing.holders.len();
                        existing.chain = record.chain;
                        existing.status = record.status;
                        existing.processed_at = Utc::now();
                        existing.clone()
                    }
                    None => {
                        let mut fresh = record;
                        let holders = std::mem::take(&mut fresh.holders);
                        merge_holders(&mut fresh.holders, holders);
                        fresh.holders_count = fresh.holders.len();
                        doc.contracts.push(fresh.clone());
                        fresh
                    }
                }
            })
            .await
            .map_err(|e| {
                error!("Failed to save processed contract {}: {}", address, e);
                e
            })?;

        if saved.status == ParsingStatus::Completed {
            self.remove_progress(&saved.address).await;
        }
        Ok(saved)
    }

    pub async fn get_processed_contract(
        &self,
        address: &str,
    ) -> Result<Option<ProcessedContract>, StorageError> {
        Ok(self
            .processed
            .read()
            .await?
            .contracts
            .into_iter()
            .find(|c| c.address == address))
    }

    pub async fn is_contract_processed(&self, address: &str) -> Result<bool, StorageError> {
        Ok(self
            .get_processed_contract(address)
            .await?
            .is_some_and(|c| c.status == ParsingStatus::Completed))
    }

    /// Every stored processed-contract record
    pub async fn processed_contracts(&self) -> Result<Vec<ProcessedContract>, StorageError> {
        Ok(self.processed.read().await?.contracts)
    }

    // --- pending holders ---

    /// Union-merges `holders` into the contract's pending list
    pub async fn add_pending_holders(&self, address: &str, holders: Vec<Holder>) {
        if holders.is_empty() {
            return;
        }
        let result = self
            .pending
            .update(|doc| {
                let list = doc.pending.entry(address.to_string()).or_default();
                merge_holders(list, holders)
            })
            .await;

        match result {
            Ok(added) => debug!("Queued {} pending holders for {}", added, address),
            Err(e) => error!("Failed to save pending holders for {}: {}", address, e),
        }
    }

    pub async fn get_pending_holders(&self, address: &str) -> Result<Vec<Holder>, StorageError> {
        Ok(self
            .pending
            .read()
            .await?
            .pending
            .remove(address)
            .unwrap_or_default())
    }

    /// Records a downstream lookup for one pending holder. Returns `false`
    /// when the holder is not pending for that contract.
    pub async fn complete_pending_holder(
        &self,
        contract: &str,
        holder: &str,
        balance: &str,
    ) -> Result<bool, StorageError> {
        let updated = self
            .pending
            .update(|doc| {
                let Some(entry) = doc
                    .pending
                    .get_mut(contract)
                    .and_then(|list| list.iter_mut().find(|h| h.address == holder))
                else {
                    return false;
                };
                entry.balance = balance.to_string();
                entry.processed = true;
                entry.processed_at = Some(Utc::now());
                true
            })
            .await?;

        if !updated {
            warn!("Holder {} is not pending for {}", holder, contract);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contract;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_empty_documents() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path().join("db")).await.unwrap();

        for name in [PROCESSED_FILE, PENDING_FILE, PROGRESS_FILE] {
            assert!(store.dir().join(name).exists(), "{} missing", name);
        }
        let raw = std::fs::read_to_string(store.dir().join(PENDING_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["pending"].is_object());
    }

    #[tokio::test]
    async fn test_completed_save_removes_progress() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let contract = Contract::new("0xabc", "ethereum");

        store
            .save_progress(ParsingProgress::new("0xabc", 3, ParsingStatus::InProgress))
            .await;
        assert!(store.get_progress("0xabc").await.unwrap().is_some());

        store
            .save_processed_contract(ProcessedContract::new(
                &contract,
                vec![Holder::new("0x1")],
                ParsingStatus::Completed,
            ))
            .await
            .unwrap();

        assert!(store.get_progress("0xabc").await.unwrap().is_none());
        assert!(store.is_contract_processed("0xabc").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_processed_file_propagates() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join(PROCESSED_FILE), "[[[").unwrap();

        let result = store
            .save_processed_contract(ProcessedContract::new(
                &Contract::new("0xabc", "ethereum"),
                Vec::new(),
                ParsingStatus::InProgress,
            ))
            .await;
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }
}
