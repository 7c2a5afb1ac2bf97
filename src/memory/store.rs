//! Memory Store Module
//!
//! Hot tier of the cache: HashMap storage bounded by entry count and total
//! payload size, with TTL expiration and policy-driven eviction.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::config::EvictionPolicy;
use crate::entry::CacheEntry;
use crate::key::CacheKey;
use crate::memory::EvictionQueue;
use crate::stats::CacheStats;

// == Memory Cache ==
/// In-process cache tier with TTL expiration and bounded capacity.
///
/// Both bounds are enforced on every insert: after the new entry lands, the
/// candidates the eviction policy names are removed until the entry count
/// and the total payload size are back within budget.
#[derive(Debug)]
pub struct MemoryCache {
    /// Key-value storage
    entries: HashMap<CacheKey, CacheEntry>,
    /// Eviction candidate ordering
    eviction: EvictionQueue,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Maximum total payload bytes allowed
    max_bytes: usize,
    /// TTL for entries stored without an explicit TTL
    default_ttl: Duration,
    /// Current total payload bytes
    total_size_bytes: usize,
}

impl MemoryCache {
    // == Constructor ==
    /// Creates a new MemoryCache.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the tier can hold
    /// * `max_bytes` - Maximum total payload bytes the tier can hold
    /// * `default_ttl` - TTL applied when an insert passes no explicit TTL
    /// * `policy` - Eviction ordering under capacity pressure
    pub fn new(
        max_entries: usize,
        max_bytes: usize,
        default_ttl: Duration,
        policy: EvictionPolicy,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            eviction: EvictionQueue::new(policy),
            stats: CacheStats::new(),
            max_entries,
            max_bytes,
            default_ttl,
            total_size_bytes: 0,
        }
    }

    // == Insert ==
    /// Stores a payload under a key with an optional TTL.
    ///
    /// If the key already exists, the entry is replaced and its TTL reset.
    /// A payload larger than the entire byte budget is not stored at all;
    /// the insert is a logged no-op (an existing entry under the key is
    /// still replaced, i.e. removed).
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `value` - The payload to store
    /// * `ttl` - Optional TTL (uses the default TTL if None)
    pub fn insert(&mut self, key: CacheKey, value: Bytes, ttl: Option<Duration>) {
        // Overwrite always displaces the previous entry first
        self.discard(&key);

        if value.len() > self.max_bytes {
            debug!(
                key = %key,
                size = value.len(),
                budget = self.max_bytes,
                "payload exceeds memory byte budget, not stored"
            );
            self.sync_sizes();
            return;
        }

        let effective_ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(value, effective_ttl);

        self.total_size_bytes += entry.size_bytes;
        self.eviction.insert(&key, entry.expires_at);
        self.entries.insert(key, entry);

        // Trim back within both budgets
        while self.entries.len() > self.max_entries || self.total_size_bytes > self.max_bytes {
            match self.eviction.pop_candidate() {
                Some(victim) => {
                    if let Some(evicted) = self.entries.remove(&victim) {
                        self.total_size_bytes -= evicted.size_bytes;
                    }
                    self.stats.record_eviction();
                    debug!(key = %victim, "evicted under capacity pressure");
                }
                None => break,
            }
        }

        self.sync_sizes();
    }

    // == Get ==
    /// Retrieves a payload by key.
    ///
    /// Expired entries are removed on access and reported as misses, so a
    /// stale payload is never served regardless of sweep timing. Hits
    /// refresh the entry's access metadata and eviction ordering.
    pub fn get(&mut self, key: &CacheKey) -> Option<Bytes> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.discard(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            self.sync_sizes();
            return None;
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch();
                let value = entry.value.clone();
                self.eviction.touch(key);
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Remove ==
    /// Removes an entry by key. Unknown keys are a no-op.
    pub fn remove(&mut self, key: &CacheKey) {
        self.discard(key);
        self.sync_sizes();
    }

    // == Clear ==
    /// Removes every entry. Statistics counters are preserved.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.eviction.clear();
        self.total_size_bytes = 0;
        self.sync_sizes();
    }

    // == Purge ==
    /// Drops every entry in response to memory pressure.
    ///
    /// This is the hook platform shims call on low-memory notifications.
    /// Only this tier is affected; entries persisted to disk remain
    /// loadable.
    pub fn purge(&mut self) {
        let dropped = self.entries.len();
        self.clear();
        debug!(dropped, "memory tier purged");
    }

    // == Cleanup Expired ==
    /// Removes all expired entries.
    ///
    /// Called by the background sweep. Correctness never depends on this
    /// running: `get` re-checks expiry on every access.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();

        for key in expired_keys {
            self.discard(&key);
            self.stats.record_expiration();
        }

        self.sync_sizes();
        count
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_sizes(self.entries.len(), self.total_size_bytes);
        stats
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the tier holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Total Size ==
    /// Returns the total payload size in bytes.
    pub fn total_size_bytes(&self) -> usize {
        self.total_size_bytes
    }

    /// Removes an entry from the map and the eviction ordering.
    fn discard(&mut self, key: &CacheKey) {
        if let Some(removed) = self.entries.remove(key) {
            self.total_size_bytes -= removed.size_bytes;
        }
        self.eviction.remove(key);
    }

    fn sync_sizes(&mut self) {
        self.stats
            .set_sizes(self.entries.len(), self.total_size_bytes);
    }
}
