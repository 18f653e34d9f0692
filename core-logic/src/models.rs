//! # Crawl Data Model
//!
//! Records persisted by the checkpoint store and pool snapshots. Field names
//! are snake_case on disk, timestamps are RFC-3339 strings and enum values
//! are their lower-case names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A token contract to crawl
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    pub address: String,
    pub chain: String,
}

impl Contract {
    pub fn new(address: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain: chain.into(),
        }
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.chain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl ParsingStatus {
    /// Contracts in these states are picked up first on the next run
    pub fn is_unfinished(self) -> bool {
        matches!(self, ParsingStatus::InProgress | ParsingStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParsingStatus::NotStarted => "NOT_STARTED",
            ParsingStatus::InProgress => "IN_PROGRESS",
            ParsingStatus::Completed => "COMPLETED",
            ParsingStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ParsingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One holder address of a contract. `balance` stays decimal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holder {
    pub address: String,
    pub balance: String,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Holder {
    /// Freshly discovered holder awaiting enrichment
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_balance(address, "0")
    }

    pub fn with_balance(address: impl Into<String>, balance: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: balance.into(),
            processed: false,
            processed_at: None,
        }
    }
}

/// Appends every holder of `incoming` whose address is not already in
/// `existing`. Existing entries are kept verbatim. Returns the number added.
pub fn merge_holders(existing: &mut Vec<Holder>, incoming: Vec<Holder>) -> usize {
    let mut seen: HashSet<String> = existing.iter().map(|h| h.address.clone()).collect();
    let before = existing.len();
    for holder in incoming {
        if seen.insert(holder.address.clone()) {
            existing.push(holder);
        }
    }
    existing.len() - before
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedContract {
    pub address: String,
    pub chain: String,
    pub processed_at: DateTime<Utc>,
    pub holders_count: usize,
    pub holders: Vec<Holder>,
    pub status: ParsingStatus,
}

impl ProcessedContract {
    pub fn new(contract: &Contract, holders: Vec<Holder>, status: ParsingStatus) -> Self {
        let mut record = Self {
            address: contract.address.clone(),
            chain: contract.chain.clone(),
            processed_at: Utc::now(),
            holders_count: 0,
            holders: Vec::new(),
            status,
        };
        merge_holders(&mut record.holders, holders);
        record.holders_count = record.holders.len();
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingProgress {
    pub contract_address: String,
    pub current_page: u64,
    pub total_pages: Option<u64>,
    pub last_processed_at: DateTime<Utc>,
    pub status: ParsingStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ParsingProgress {
    pub fn new(contract_address: impl Into<String>, current_page: u64, status: ParsingStatus) -> Self {
        Self {
            contract_address: contract_address.into(),
            current_page,
            total_pages: None,
            last_processed_at: Utc::now(),
            status,
            error_message: None,
        }
    }

    pub fn with_total_pages(mut self, total_pages: Option<u64>) -> Self {
        self.total_pages = total_pages;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Health record of one proxy or header identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub identifier: String,
    pub is_working: bool,
    pub fail_count: u32,
    pub last_used_at: DateTime<Utc>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub request_count: u32,
}

impl PoolEntry {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            is_working: true,
            fail_count: 0,
            last_used_at: Utc::now(),
            cooldown_until: None,
            request_count: 0,
        }
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}
