//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::key::CacheKey;

/// Boxed error type accepted from origin fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// The enum is `Clone` because one fetch outcome fans out to every
/// coalesced waiter; wrapped causes are therefore stored behind `Arc`.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Origin fetch failed
    #[error("fetch failed for '{key}': {source}")]
    Fetch {
        key: CacheKey,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Origin fetch exceeded the configured timeout
    #[error("fetch for '{key}' timed out after {timeout:?}")]
    FetchTimeout { key: CacheKey, timeout: Duration },

    /// Disk tier I/O failure
    #[error("i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },

    /// Stored entry failed an integrity check
    #[error("corrupted entry for '{key}': {reason}")]
    CorruptedEntry { key: CacheKey, reason: String },

    /// Configuration rejected at construction or call time
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps an origin fetcher failure for the given key.
    pub fn fetch(key: CacheKey, source: BoxError) -> Self {
        Self::Fetch {
            key,
            source: Arc::from(source),
        }
    }

    /// Wraps an I/O failure at the given path.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
