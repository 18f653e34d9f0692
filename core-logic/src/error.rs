//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for crawl operations.
///
/// This enum wraps all specific error types and provides a unified
/// error interface for the engine and scheduler.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(ConfigError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error(transparent)]
    Network(NetworkError),

    #[error(transparent)]
    Pool(PoolError),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        CoreError::Storage(e)
    }
}

impl From<NetworkError> for CoreError {
    fn from(e: NetworkError) -> Self {
        CoreError::Network(e)
    }
}

impl From<PoolError> for CoreError {
    fn from(e: PoolError) -> Self {
        CoreError::Pool(e)
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },

    #[error("No {what} found in {path}")]
    EmptyList { path: String, what: String },

    #[error("Invalid line {line} in {path}: {reason}")]
    InvalidLine {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Unsupported chain: '{chain}'")]
    UnknownChain { chain: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Checkpoint and snapshot persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Network and upstream API errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("HTTP error {status_code} from {endpoint}: {message}")]
    HttpError {
        status_code: u16,
        endpoint: String,
        message: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Invalid proxy '{proxy}': {reason}")]
    InvalidProxy { proxy: String, reason: String },
}

/// Resource pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No {pool} available: every entry is disabled, cooling down or over quota")]
    Exhausted { pool: String },

    #[error("Unknown {pool} entry '{identifier}'")]
    UnknownEntry { pool: String, identifier: String },
}
