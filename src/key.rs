//! Cache Key Module
//!
//! Defines the normalized identifier shared by every cache tier.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// == Cache Key ==
/// Identifies a cached resource.
///
/// Keys are opaque normalized strings (URLs, content ids, request
/// signatures). Both tiers and the in-flight registry index entries by
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    // == Constructor ==
    /// Creates a new cache key from any string-like value.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    // == File Stem ==
    /// Returns the SHA-256 hex digest of the key.
    ///
    /// Disk file names are derived from this digest so that arbitrary key
    /// content (path separators, very long URLs) stays filesystem-safe and
    /// bounded in length.
    pub fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
