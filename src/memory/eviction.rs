//! Eviction Queue Module
//!
//! Maintains the candidate ordering the memory tier evicts from under
//! capacity pressure.

use std::collections::{BTreeMap, HashMap};

use crate::config::EvictionPolicy;
use crate::key::CacheKey;

// == Eviction Queue ==
/// Tracks eviction candidates for the configured policy.
///
/// Entries are ordered by a `(rank, seq)` pair where the policy decides the
/// rank and `seq` is a monotonic counter breaking ties deterministically.
/// The entry with the smallest pair is the next eviction candidate. Every
/// operation is O(log n).
///
/// Rank per policy:
/// - `Lru`: access sequence number, refreshed on every touch
/// - `Lfu`: access count, with the sequence refreshed so equal counts fall
///   back to least-recently-used order
/// - `Fifo`: insertion sequence number, never refreshed
/// - `TtlOnly`: expiration timestamp, soonest-expiring first
#[derive(Debug)]
pub struct EvictionQueue {
    /// Active policy
    policy: EvictionPolicy,
    /// Candidate ordering, smallest (rank, seq) evicted first
    ordered: BTreeMap<(u64, u64), CacheKey>,
    /// Position of each key in the ordering
    index: HashMap<CacheKey, (u64, u64)>,
    /// Monotonic sequence counter
    next_seq: u64,
}

impl EvictionQueue {
    // == Constructor ==
    /// Creates a new empty queue for the given policy.
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            ordered: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // == Insert ==
    /// Registers a key that was just inserted into the store.
    ///
    /// Re-inserting an existing key moves it to a fresh position, matching
    /// overwrite semantics.
    ///
    /// # Arguments
    /// * `key` - The key that was stored
    /// * `expires_at` - The entry's expiration timestamp (Unix milliseconds),
    ///   used as the rank under `TtlOnly`
    pub fn insert(&mut self, key: &CacheKey, expires_at: u64) {
        self.remove(key);

        let seq = self.bump_seq();
        let rank = match self.policy {
            EvictionPolicy::Lru | EvictionPolicy::Fifo => seq,
            EvictionPolicy::Lfu => 0,
            EvictionPolicy::TtlOnly => expires_at,
        };

        self.ordered.insert((rank, seq), key.clone());
        self.index.insert(key.clone(), (rank, seq));
    }

    // == Touch ==
    /// Records an access to a key, reordering it per the policy.
    ///
    /// Unknown keys and order-insensitive policies (`Fifo`, `TtlOnly`) are
    /// no-ops.
    pub fn touch(&mut self, key: &CacheKey) {
        let (rank, seq) = match self.index.get(key) {
            Some(pos) => *pos,
            None => return,
        };

        let new_rank = match self.policy {
            EvictionPolicy::Lru => self.next_seq,
            EvictionPolicy::Lfu => rank + 1,
            EvictionPolicy::Fifo | EvictionPolicy::TtlOnly => return,
        };

        self.ordered.remove(&(rank, seq));
        let new_seq = self.bump_seq();
        self.ordered.insert((new_rank, new_seq), key.clone());
        self.index.insert(key.clone(), (new_rank, new_seq));
    }

    // == Remove ==
    /// Removes a key from the queue. Unknown keys are a no-op.
    pub fn remove(&mut self, key: &CacheKey) {
        if let Some(pos) = self.index.remove(key) {
            self.ordered.remove(&pos);
        }
    }

    // == Pop Candidate ==
    /// Removes and returns the next eviction candidate.
    ///
    /// Returns None if the queue is empty.
    pub fn pop_candidate(&mut self) -> Option<CacheKey> {
        let (pos, key) = self.ordered.pop_first()?;
        debug_assert_eq!(self.index.get(&key), Some(&pos));
        self.index.remove(&key);
        Some(key)
    }

    // == Peek Candidate ==
    /// Returns the next eviction candidate without removing it.
    pub fn peek_candidate(&self) -> Option<&CacheKey> {
        self.ordered.first_key_value().map(|(_, key)| key)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    // == Clear ==
    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    #[test]
    fn test_queue_new_is_empty() {
        let queue = EvictionQueue::new(EvictionPolicy::Lru);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.peek_candidate(), None);
    }

    #[test]
    fn test_lru_evicts_in_insert_order_without_touches() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lru);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);
        queue.insert(&key("c"), 0);

        assert_eq!(queue.pop_candidate(), Some(key("a")));
        assert_eq!(queue.pop_candidate(), Some(key("b")));
        assert_eq!(queue.pop_candidate(), Some(key("c")));
        assert_eq!(queue.pop_candidate(), None);
    }

    #[test]
    fn test_lru_touch_defers_eviction() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lru);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);
        queue.insert(&key("c"), 0);

        // a becomes most recently used, so b is next out
        queue.touch(&key("a"));

        assert_eq!(queue.pop_candidate(), Some(key("b")));
        assert_eq!(queue.pop_candidate(), Some(key("c")));
        assert_eq!(queue.pop_candidate(), Some(key("a")));
    }

    #[test]
    fn test_fifo_ignores_touches() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Fifo);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);

        queue.touch(&key("a"));
        queue.touch(&key("a"));

        assert_eq!(queue.pop_candidate(), Some(key("a")));
        assert_eq!(queue.pop_candidate(), Some(key("b")));
    }

    #[test]
    fn test_lfu_evicts_least_frequently_used() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lfu);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);
        queue.insert(&key("c"), 0);

        queue.touch(&key("a"));
        queue.touch(&key("a"));
        queue.touch(&key("c"));

        // b was never accessed
        assert_eq!(queue.pop_candidate(), Some(key("b")));
        assert_eq!(queue.pop_candidate(), Some(key("c")));
        assert_eq!(queue.pop_candidate(), Some(key("a")));
    }

    #[test]
    fn test_lfu_breaks_ties_by_recency() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lfu);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);

        // Equal counts, a touched before b, so a goes first
        queue.touch(&key("a"));
        queue.touch(&key("b"));

        assert_eq!(queue.pop_candidate(), Some(key("a")));
        assert_eq!(queue.pop_candidate(), Some(key("b")));
    }

    #[test]
    fn test_ttl_only_evicts_soonest_expiring() {
        let mut queue = EvictionQueue::new(EvictionPolicy::TtlOnly);

        queue.insert(&key("late"), 3000);
        queue.insert(&key("soon"), 1000);
        queue.insert(&key("mid"), 2000);

        assert_eq!(queue.pop_candidate(), Some(key("soon")));
        assert_eq!(queue.pop_candidate(), Some(key("mid")));
        assert_eq!(queue.pop_candidate(), Some(key("late")));
    }

    #[test]
    fn test_reinsert_moves_key() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lru);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);
        // Overwriting a makes it the freshest entry
        queue.insert(&key("a"), 0);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_candidate(), Some(key("b")));
        assert_eq!(queue.pop_candidate(), Some(key("a")));
    }

    #[test]
    fn test_remove_untracks_key() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lru);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);

        queue.remove(&key("a"));

        assert_eq!(queue.len(), 1);
        assert!(!queue.contains(&key("a")));
        assert_eq!(queue.pop_candidate(), Some(key("b")));
    }

    #[test]
    fn test_remove_unknown_key_is_noop() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lru);

        queue.insert(&key("a"), 0);
        queue.remove(&key("ghost"));

        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&key("a")));
    }

    #[test]
    fn test_touch_unknown_key_is_noop() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lru);
        queue.touch(&key("ghost"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue = EvictionQueue::new(EvictionPolicy::Lfu);

        queue.insert(&key("a"), 0);
        queue.insert(&key("b"), 0);
        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(queue.pop_candidate(), None);
    }
}
