//! Error types for cpfm-core
//!
//! Store failures surface to callers. Everything else (bad payloads, cache
//! outages, bad filter input) is recovered locally and reported as a
//! warning, so the dashboard shows partial data instead of an error page.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for cpfm operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Store Errors
    // ===================
    #[error("Row store query failed: {operation}")]
    Store {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Row store unavailable: {message}")]
    StoreUnavailable { message: String },

    // ===================
    // Cache Errors
    // ===================
    #[error("Cache backend error: {message}")]
    Cache { message: String },

    #[error("Failed to encode cache entry {key}")]
    CacheEncode {
        key: String,
        #[source]
        source: bincode::Error,
    },

    // ===================
    // Payload Errors
    // ===================
    #[error("Malformed serialized payload at byte {offset}: {message}")]
    PayloadParse { offset: usize, message: String },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // ===================
    // Scan Control
    // ===================
    #[error("Scan cancelled after {rows_scanned} rows")]
    Cancelled { rows_scanned: usize },
}

impl CoreError {
    /// Wrap a SQLite error with the operation that produced it
    pub fn store(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| CoreError::Store { operation, source }
    }

    /// Whether the failure came from the row store (visible error state)
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            CoreError::Store { .. } | CoreError::StoreUnavailable { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled { .. })
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_helper_keeps_operation() {
        let err = CoreError::store("telemetry_batch")(rusqlite::Error::InvalidQuery);
        assert!(err.is_store_failure());
        assert!(err.to_string().contains("telemetry_batch"));
    }

    #[test]
    fn test_cache_errors_are_not_store_failures() {
        let err = CoreError::Cache {
            message: "backend down".into(),
        };
        assert!(!err.is_store_failure());
        assert!(!err.is_cancelled());
        assert!(CoreError::Cancelled { rows_scanned: 10 }.is_cancelled());
    }
}
