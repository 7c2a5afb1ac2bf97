//! Cache Entry Module
//!
//! Defines the structure for individual in-memory cache entries with TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

// == Cache Entry ==
/// A single in-memory cache entry: the payload plus expiry and access metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored payload
    pub value: Bytes,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Last access timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Payload size in bytes, always equal to `value.len()`
    pub size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    ///
    /// Sub-millisecond TTLs round up to one millisecond so that
    /// `expires_at` always lies strictly after `created_at`.
    ///
    /// # Arguments
    /// * `value` - The payload to store
    /// * `ttl` - Time to live for this entry
    pub fn new(value: Bytes, ttl: Duration) -> Self {
        let now = current_timestamp_ms();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let size_bytes = value.len();

        Self {
            value,
            created_at: now,
            expires_at: now + ttl_ms,
            last_accessed_at: now,
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired when the current time is
    /// greater than or equal to the expiration time, so an entry whose TTL
    /// has fully elapsed is never served.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining lifetime of the entry.
    ///
    /// Returns `Duration::ZERO` once the entry has expired.
    pub fn ttl_remaining(&self) -> Duration {
        let now = current_timestamp_ms();
        if self.expires_at > now {
            Duration::from_millis(self.expires_at - now)
        } else {
            Duration::ZERO
        }
    }

    // == Touch ==
    /// Records an access at the current time.
    pub fn touch(&mut self) {
        self.last_accessed_at = current_timestamp_ms();
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
