use crate::error::NetworkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One page query against the holder-list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub chain_id: u64,
    pub contract_address: String,
    pub page: u64,
    pub limit: u32,
}

/// Resources the executor picked for a single call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestRoute {
    pub api_key: String,
    /// `None` means a direct connection
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

/// `data` items come back either as bare address strings or as objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HolderEntry {
    Address(String),
    Detailed {
        address: String,
        #[serde(default)]
        balance: Option<serde_json::Value>,
    },
}

impl HolderEntry {
    pub fn address(&self) -> &str {
        match self {
            HolderEntry::Address(address) => address,
            HolderEntry::Detailed { address, .. } => address,
        }
    }

    /// Balance as decimal text, if the upstream sent one
    pub fn balance(&self) -> Option<String> {
        match self {
            HolderEntry::Detailed {
                balance: Some(serde_json::Value::String(s)),
                ..
            } => Some(s.clone()),
            HolderEntry::Detailed {
                balance: Some(serde_json::Value::Number(n)),
                ..
            } => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Decoded 2xx response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldersPage {
    /// Upstream status code; 2xx decides success, not this
    pub code: Option<i64>,
    pub message: Option<String>,
    pub data: Vec<HolderEntry>,
    /// Server cursor; `None` ends pagination
    pub next_page: Option<u64>,
    pub count: Option<u64>,
    /// Derived from a positive `count` only; unknown otherwise
    pub total_pages: Option<u64>,
}

/// The upstream holder-list source. Implementations classify every
/// transport failure and non-2xx status as a [`NetworkError`].
#[async_trait]
pub trait HoldersApi: Send + Sync {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        route: &RequestRoute,
    ) -> Result<HoldersPage, NetworkError>;
}
