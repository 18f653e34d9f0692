use crate::error::ConfigError;
use crate::utils::list_loader::load_credentials;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cyclic rotation over a fixed set of API keys. No health tracking:
/// exhausted keys surface as ordinary upstream failures.
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<String>,
    current_index: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::EmptyList {
                path: "<memory>".to_string(),
                what: "API keys".to_string(),
            });
        }
        Ok(Self {
            keys,
            current_index: AtomicUsize::new(0),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::new(load_credentials(path)?)
    }

    /// Next key in round-robin order
    pub fn next_key(&self) -> &str {
        let idx = self.current_index.fetch_add(1, Ordering::SeqCst);
        &self.keys[idx % self.keys.len()]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Shortened key for logs
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{}...", prefix)
}
