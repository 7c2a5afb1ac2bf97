//! Disk Store Module
//!
//! Cold tier of the cache: payload files with metadata sidecars, written
//! atomically and reclaimed by a recovery/periodic sweep.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::disk::{tmp_path, MetadataRecord, MetadataStore, PAYLOAD_EXT};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

// == Sweep Stats ==
/// Outcome of one sweep pass over the disk tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    /// Entries removed because their TTL elapsed
    pub expired: usize,
    /// Entries removed because payload and sidecar disagreed
    pub corrupted: usize,
    /// Stray files removed: orphaned payloads, dangling sidecars, and
    /// staging leftovers
    pub orphaned: usize,
    /// Entries removed to get back under the tier budgets
    pub evicted: usize,
    /// Entries remaining after the sweep
    pub remaining_entries: usize,
    /// Payload bytes remaining after the sweep
    pub remaining_bytes: u64,
}

impl SweepStats {
    /// Total number of files or entries the sweep removed.
    pub fn total_removed(&self) -> usize {
        self.expired + self.corrupted + self.orphaned + self.evicted
    }
}

// == Disk Cache ==
/// Persistent cache tier surviving process restarts.
///
/// Layout: one `<sha256(key)>.bin` payload per key next to a
/// `<sha256(key)>.meta` JSON sidecar. There is no global index file; the
/// directory itself is the source of truth and the sweep reconciles it.
///
/// Failure discipline: the load path never surfaces errors. I/O problems
/// and integrity failures degrade to a miss, deleting whatever remains of
/// the entry, so a damaged tier costs refetches rather than correctness.
#[derive(Debug)]
pub struct DiskCache {
    /// Tier root directory
    root: PathBuf,
    /// Sidecar store co-located with the payloads
    metadata: MetadataStore,
    /// Maximum number of entries the sweep lets survive
    max_entries: usize,
    /// Maximum total payload bytes the sweep lets survive
    max_bytes: u64,
}

impl DiskCache {
    // == Constructor ==
    /// Opens (or creates) the tier at `root` and runs a recovery sweep.
    ///
    /// The recovery sweep deletes entries that expired while the process
    /// was down, clears staging leftovers from interrupted writes, and
    /// re-enforces the tier budgets.
    pub async fn new(root: impl Into<PathBuf>, max_entries: usize, max_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(&root, e))?;

        let cache = Self {
            metadata: MetadataStore::new(root.clone()),
            root,
            max_entries,
            max_bytes,
        };

        let stats = cache.sweep().await;
        if stats.total_removed() > 0 {
            info!(
                expired = stats.expired,
                corrupted = stats.corrupted,
                orphaned = stats.orphaned,
                evicted = stats.evicted,
                "disk tier recovered"
            );
        } else {
            debug!(entries = stats.remaining_entries, "disk tier opened clean");
        }

        Ok(cache)
    }

    /// Returns the payload path for a key.
    fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.file_stem(), PAYLOAD_EXT))
    }

    // == Save ==
    /// Persists a payload under a key with the given TTL.
    ///
    /// The payload lands first, then the sidecar; each is staged to a
    /// `.tmp` path and renamed into place. A failed sidecar write rolls
    /// the payload back so the tier never advertises an entry it cannot
    /// validate.
    pub async fn save(&self, key: &CacheKey, value: &Bytes, ttl: Duration) -> Result<()> {
        let payload_path = self.payload_path(key);
        let staging = tmp_path(&payload_path);

        fs::write(&staging, value)
            .await
            .map_err(|e| CacheError::io(&staging, e))?;

        if let Err(e) = fs::rename(&staging, &payload_path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(CacheError::io(&payload_path, e));
        }

        let record = MetadataRecord::new(key.clone(), value.len() as u64, ttl);
        if let Err(e) = self.metadata.write(&record).await {
            let _ = fs::remove_file(&payload_path).await;
            return Err(e);
        }

        debug!(key = %key, size = value.len(), "persisted to disk tier");
        Ok(())
    }

    // == Load ==
    /// Loads a payload and its remaining TTL.
    ///
    /// Any failure on this path converts to a miss: expired entries are
    /// deleted, sidecars without payloads are dropped, and a size mismatch
    /// discards the whole entry. Hits refresh the sidecar's access time
    /// (best effort) so the disk eviction order tracks real use.
    ///
    /// The remaining TTL lets callers promote the payload into the memory
    /// tier without extending its lifetime.
    pub async fn load(&self, key: &CacheKey) -> Option<(Bytes, Duration)> {
        let mut record = match self.metadata.read(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(CacheError::CorruptedEntry { reason, .. }) => {
                warn!(key = %key, reason = %reason, "removing corrupted disk entry");
                self.remove_files(key).await;
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "disk metadata unreadable, treating as miss");
                return None;
            }
        };

        if record.is_expired() {
            debug!(key = %key, "disk entry expired");
            self.remove_files(key).await;
            return None;
        }

        let payload_path = self.payload_path(key);
        let bytes = match fs::read(&payload_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(key = %key, "payload missing for live sidecar, dropping entry");
                let _ = self.metadata.delete(key).await;
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "disk payload unreadable, treating as miss");
                return None;
            }
        };

        if bytes.len() as u64 != record.size_bytes {
            warn!(
                key = %key,
                expected = record.size_bytes,
                actual = bytes.len(),
                "payload size mismatch, removing corrupted disk entry"
            );
            self.remove_files(key).await;
            return None;
        }

        let remaining = record.ttl_remaining();
        if remaining.is_zero() {
            self.remove_files(key).await;
            return None;
        }

        record.touch();
        if let Err(e) = self.metadata.write(&record).await {
            debug!(key = %key, error = %e, "failed to refresh access time");
        }

        Some((Bytes::from(bytes), remaining))
    }

    // == Remove ==
    /// Removes an entry and any staging leftovers. Unknown keys are a
    /// no-op.
    pub async fn remove(&self, key: &CacheKey) -> Result<()> {
        let payload_path = self.payload_path(key);
        match fs::remove_file(&payload_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&payload_path, e)),
        }
        self.metadata.delete(key).await?;
        let _ = fs::remove_file(tmp_path(&payload_path)).await;
        let _ = fs::remove_file(tmp_path(&self.metadata.path_for(key))).await;
        Ok(())
    }

    /// Best-effort removal of both entry files, for the fail-open paths.
    async fn remove_files(&self, key: &CacheKey) {
        if let Err(e) = self.remove(key).await {
            warn!(key = %key, error = %e, "failed to remove disk entry");
        }
    }

    // == Clear ==
    /// Removes every entry and recreates an empty tier root.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&self.root, e)),
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))
    }

    // == Sweep ==
    /// Reconciles the directory with the sidecar records and re-enforces
    /// the tier budgets.
    ///
    /// Removes, in order: undecodable sidecars (through the metadata
    /// listing), stale staging files, expired entries, entries whose
    /// payload is missing or has the wrong size, payloads with no sidecar,
    /// and finally the oldest entries by last access until the tier fits
    /// its budgets. The sweep never fails; problems are logged and the
    /// pass continues.
    pub async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        let (records, corrupted_sidecars) = match self.metadata.list_all().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "sweep could not list metadata, skipping pass");
                return stats;
            }
        };
        stats.corrupted += corrupted_sidecars;

        // One directory scan for payload sizes and staging leftovers
        let payload_suffix = format!(".{}", PAYLOAD_EXT);
        let mut payload_sizes: HashMap<String, u64> = HashMap::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "sweep could not scan tier root, skipping pass");
                return stats;
            }
        };
        loop {
            let dir_entry = match dir.next_entry().await {
                Ok(Some(dir_entry)) => dir_entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "sweep directory scan interrupted");
                    break;
                }
            };
            let path = dir_entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            else {
                continue;
            };

            if name.ends_with(".tmp") {
                debug!(path = %path.display(), "removing stale staging file");
                let _ = fs::remove_file(&path).await;
                stats.orphaned += 1;
                continue;
            }

            if let Some(stem) = name.strip_suffix(&payload_suffix) {
                let size = match dir_entry.metadata().await {
                    Ok(meta) => meta.len(),
                    Err(_) => 0,
                };
                payload_sizes.insert(stem.to_string(), size);
            }
        }

        // Validate each record against its payload
        let mut live: Vec<MetadataRecord> = Vec::new();
        for record in records {
            let stem = record.key.file_stem();

            if record.is_expired() {
                debug!(key = %record.key, "sweep removing expired entry");
                self.remove_files(&record.key).await;
                payload_sizes.remove(&stem);
                stats.expired += 1;
                continue;
            }

            match payload_sizes.get(&stem) {
                None => {
                    warn!(key = %record.key, "sweep dropping sidecar without payload");
                    let _ = self.metadata.delete(&record.key).await;
                    stats.orphaned += 1;
                }
                Some(&size) if size != record.size_bytes => {
                    warn!(
                        key = %record.key,
                        expected = record.size_bytes,
                        actual = size,
                        "sweep removing entry with mismatched payload size"
                    );
                    self.remove_files(&record.key).await;
                    payload_sizes.remove(&stem);
                    stats.corrupted += 1;
                }
                Some(_) => {
                    payload_sizes.remove(&stem);
                    live.push(record);
                }
            }
        }

        // Payloads left unmatched have no sidecar
        for (stem, _) in payload_sizes {
            let path = self.root.join(format!("{}.{}", stem, PAYLOAD_EXT));
            warn!(path = %path.display(), "sweep removing orphaned payload");
            let _ = fs::remove_file(&path).await;
            stats.orphaned += 1;
        }

        // Budget enforcement: oldest last access goes first
        live.sort_by_key(|record| record.last_accessed_at);
        let mut total_bytes: u64 = live.iter().map(|r| r.size_bytes).sum();
        let mut survivors = live.len();

        let mut victims = live.iter();
        while survivors > self.max_entries || total_bytes > self.max_bytes {
            let Some(victim) = victims.next() else { break };
            debug!(key = %victim.key, "sweep evicting for budget");
            self.remove_files(&victim.key).await;
            total_bytes -= victim.size_bytes;
            survivors -= 1;
            stats.evicted += 1;
        }

        stats.remaining_entries = survivors;
        stats.remaining_bytes = total_bytes;
        stats
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const NO_LIMITS: (usize, u64) = (usize::MAX, u64::MAX);

    async fn open(dir: &tempfile::TempDir) -> DiskCache {
        DiskCache::new(dir.path(), NO_LIMITS.0, NO_LIMITS.1)
            .await
            .unwrap()
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    fn payload(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;

        cache
            .save(&key("k1"), &payload("hello"), Duration::from_secs(60))
            .await
            .unwrap();

        let (value, remaining) = cache.load(&key("k1")).await.unwrap();
        assert_eq!(value, payload("hello"));
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;

        assert!(cache.load(&key("ghost")).await.is_none());
    }

    #[tokio::test]
    async fn test_load_expired_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;
        let k = key("k1");

        cache
            .save(&k, &payload("v"), Duration::from_millis(30))
            .await
            .unwrap();

        sleep(Duration::from_millis(100)).await;

        assert!(cache.load(&k).await.is_none());
        assert!(!cache.payload_path(&k).exists());
        assert!(!cache.metadata.path_for(&k).exists());
    }

    #[tokio::test]
    async fn test_load_missing_payload_drops_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;
        let k = key("k1");

        cache
            .save(&k, &payload("v"), Duration::from_secs(60))
            .await
            .unwrap();

        // Payload vanishes out of band
        fs::remove_file(cache.payload_path(&k)).await.unwrap();

        assert!(cache.load(&k).await.is_none());
        assert!(
            !cache.metadata.path_for(&k).exists(),
            "dangling sidecar should be dropped"
        );
    }

    #[tokio::test]
    async fn test_load_size_mismatch_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;
        let k = key("k1");

        cache
            .save(&k, &payload("complete-body"), Duration::from_secs(60))
            .await
            .unwrap();

        fs::write(cache.payload_path(&k), b"tiny").await.unwrap();

        assert!(cache.load(&k).await.is_none());
        assert!(!cache.payload_path(&k).exists());
        assert!(!cache.metadata.path_for(&k).exists());
    }

    #[tokio::test]
    async fn test_load_corrupt_sidecar_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;
        let k = key("k1");

        cache
            .save(&k, &payload("v"), Duration::from_secs(60))
            .await
            .unwrap();

        fs::write(cache.metadata.path_for(&k), b"{not json")
            .await
            .unwrap();

        assert!(cache.load(&k).await.is_none());
        assert!(!cache.payload_path(&k).exists());
        assert!(!cache.metadata.path_for(&k).exists());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        {
            let cache = open(&dir).await;
            cache
                .save(&key("k1"), &payload("durable"), Duration::from_secs(60))
                .await
                .unwrap();
        }

        let cache = open(&dir).await;
        let (value, _) = cache.load(&key("k1")).await.unwrap();
        assert_eq!(value, payload("durable"));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;
        let k = key("k1");

        cache
            .save(&k, &payload("v"), Duration::from_secs(60))
            .await
            .unwrap();

        cache.remove(&k).await.unwrap();
        cache.remove(&k).await.unwrap();

        assert!(cache.load(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;

        cache
            .save(&key("k1"), &payload("v"), Duration::from_secs(60))
            .await
            .unwrap();

        cache.clear().await.unwrap();
        cache.clear().await.unwrap();

        assert!(cache.load(&key("k1")).await.is_none());
        // The tier stays usable after clearing
        cache
            .save(&key("k2"), &payload("w"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.load(&key("k2")).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;

        cache
            .save(&key("short"), &payload("v"), Duration::from_millis(30))
            .await
            .unwrap();
        cache
            .save(&key("long"), &payload("v"), Duration::from_secs(60))
            .await
            .unwrap();

        sleep(Duration::from_millis(100)).await;

        let stats = cache.sweep().await;
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.remaining_entries, 1);
        assert!(cache.load(&key("long")).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_strays() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(&dir).await;

        // Orphaned payload without a sidecar plus a staging leftover
        fs::write(dir.path().join("deadbeef.bin"), b"orphan")
            .await
            .unwrap();
        fs::write(dir.path().join("cafe.bin.tmp"), b"partial")
            .await
            .unwrap();

        let stats = cache.sweep().await;
        assert_eq!(stats.orphaned, 2);
        assert!(!dir.path().join("deadbeef.bin").exists());
        assert!(!dir.path().join("cafe.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_sweep_enforces_entry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), 2, u64::MAX).await.unwrap();

        for name in ["a", "b", "c", "d"] {
            cache
                .save(&key(name), &payload("v"), Duration::from_secs(60))
                .await
                .unwrap();
            // Keep last-access timestamps strictly ordered
            sleep(Duration::from_millis(5)).await;
        }

        let stats = cache.sweep().await;
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.remaining_entries, 2);

        // The two oldest entries went first
        assert!(cache.load(&key("a")).await.is_none());
        assert!(cache.load(&key("b")).await.is_none());
        assert!(cache.load(&key("c")).await.is_some());
        assert!(cache.load(&key("d")).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_enforces_byte_budget() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), usize::MAX, 8).await.unwrap();

        for name in ["a", "b", "c", "d"] {
            cache
                .save(&key(name), &payload("4444"), Duration::from_secs(60))
                .await
                .unwrap();
            sleep(Duration::from_millis(5)).await;
        }

        let stats = cache.sweep().await;
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.remaining_bytes, 8);
        assert!(cache.load(&key("c")).await.is_some());
        assert!(cache.load(&key("d")).await.is_some());
    }

    #[tokio::test]
    async fn test_recovery_sweep_on_construction() {
        let dir = tempfile::tempdir().unwrap();

        {
            let cache = open(&dir).await;
            cache
                .save(&key("expired"), &payload("v"), Duration::from_millis(30))
                .await
                .unwrap();
            cache
                .save(&key("live"), &payload("v"), Duration::from_secs(60))
                .await
                .unwrap();
        }

        // Simulate an interrupted write from a previous process
        fs::write(dir.path().join("stale.bin.tmp"), b"partial")
            .await
            .unwrap();

        sleep(Duration::from_millis(100)).await;

        let cache = open(&dir).await;
        assert!(!dir.path().join("stale.bin.tmp").exists());
        assert!(cache.load(&key("expired")).await.is_none());
        assert!(cache.load(&key("live")).await.is_some());
    }
}
