//! Cache Coordinator Module
//!
//! Front door of the cache: orchestrates the memory → disk → origin lookup
//! order, promotes disk hits into the memory tier, and coalesces concurrent
//! origin fetches so each missing key is fetched at most once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::disk::DiskCache;
use crate::error::{BoxError, CacheError, Result};
use crate::key::CacheKey;
use crate::memory::MemoryCache;
use crate::stats::CacheStats;
use crate::tasks::spawn_sweep_task;

/// Outcome shared by every caller coalesced onto one fetch.
type FetchOutcome = std::result::Result<Bytes, CacheError>;

/// Pending fetches keyed by the resource they are producing.
type InflightRegistry = Mutex<HashMap<CacheKey, broadcast::Sender<FetchOutcome>>>;

/// What a caller found in the in-flight registry.
enum Flight {
    /// Another caller owns the fetch; await its broadcast
    Joined(broadcast::Receiver<FetchOutcome>),
    /// This caller registered the flight and must drive it
    Owner(broadcast::Sender<FetchOutcome>),
}

// == Cache ==
/// Two-tier content cache with coalesced origin fetches.
///
/// Lookup order is memory, then disk (hits promoted into memory with their
/// remaining lifetime), then the caller-supplied origin fetch. While a
/// fetch for a key is outstanding, every further `get_or_fetch` for that
/// key attaches to it instead of fetching again; all attached callers
/// observe the same payload or the same error.
///
/// Construction validates the configuration, runs the disk tier's recovery
/// sweep, and spawns the periodic sweep task. Dropping the cache aborts
/// the task. Instances are independent; tests construct isolated caches
/// over their own directories.
#[derive(Debug)]
pub struct Cache {
    /// Immutable configuration the cache was built with
    config: CacheConfig,
    /// Hot tier
    memory: Arc<RwLock<MemoryCache>>,
    /// Cold tier
    disk: Arc<DiskCache>,
    /// Pending origin fetches; the mutex is never held across an await
    inflight: Arc<InflightRegistry>,
    /// Periodic sweep over both tiers
    sweep_handle: JoinHandle<()>,
}

impl Cache {
    // == Constructor ==
    /// Builds a cache from the given configuration.
    ///
    /// # Errors
    /// `CacheError::InvalidConfig` if validation rejects the configuration,
    /// `CacheError::Io` if the disk tier root cannot be opened.
    pub async fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let memory = Arc::new(RwLock::new(MemoryCache::new(
            config.memory_max_entries,
            config.memory_max_bytes,
            config.default_ttl,
            config.eviction_policy,
        )));

        let disk = Arc::new(
            DiskCache::new(
                config.cache_dir.clone(),
                config.disk_max_entries,
                config.disk_max_bytes,
            )
            .await?,
        );

        let sweep_handle = spawn_sweep_task(memory.clone(), disk.clone(), config.sweep_interval);

        info!(
            dir = %config.cache_dir.display(),
            policy = %config.eviction_policy,
            "cache ready"
        );

        Ok(Self {
            config,
            memory,
            disk,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            sweep_handle,
        })
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Get ==
    /// Looks a key up in the cache tiers only; never fetches.
    ///
    /// A disk hit is promoted into the memory tier with its remaining
    /// lifetime, so the promoted copy expires no later than the persisted
    /// one.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        if let Some(value) = self.memory.write().await.get(key) {
            return Some(value);
        }

        let (value, remaining) = self.disk.load(key).await?;
        debug!(key = %key, "disk hit promoted to memory tier");
        self.memory
            .write()
            .await
            .insert(key.clone(), value.clone(), Some(remaining));
        Some(value)
    }

    // == Get Or Fetch ==
    /// Looks a key up in both tiers, falling back to the supplied origin
    /// fetch on a miss.
    ///
    /// Concurrent calls for the same key share one fetch: the first caller
    /// registers a flight and drives it, later callers attach and await
    /// the shared outcome without invoking their own `fetch` closure. The
    /// fetch runs on a detached task, so a caller that stops waiting does
    /// not cancel it for the rest of the group; a successful fetch still
    /// lands in both tiers.
    ///
    /// # Errors
    /// `CacheError::Fetch` if the origin fetch failed, `CacheError::FetchTimeout`
    /// if it exceeded the configured `fetch_timeout`. Failures populate
    /// neither tier; the next caller fetches again.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<Bytes>
    where
        F: FnOnce(CacheKey) -> Fut,
        Fut: Future<Output = std::result::Result<Bytes, BoxError>> + Send + 'static,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let flight = {
            let mut registry = self
                .inflight
                .lock()
                .map_err(|_| CacheError::Internal("in-flight registry poisoned".to_string()))?;
            match registry.get(key) {
                Some(sender) => Flight::Joined(sender.subscribe()),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    registry.insert(key.clone(), sender.clone());
                    Flight::Owner(sender)
                }
            }
        };

        let sender = match flight {
            Flight::Joined(mut receiver) => {
                debug!(key = %key, "attached to in-flight fetch");
                return Self::await_outcome(&mut receiver).await;
            }
            Flight::Owner(sender) => sender,
        };

        // A flight that completed between the tier probes and the registry
        // insert has already populated the memory tier before deregistering,
        // so one re-probe closes that window.
        if let Some(value) = self.memory.write().await.get(key) {
            self.deregister(key);
            let _ = sender.send(Ok(value.clone()));
            return Ok(value);
        }

        let mut receiver = sender.subscribe();
        self.spawn_flight(key.clone(), fetch(key.clone()), sender);
        Self::await_outcome(&mut receiver).await
    }

    /// Drives one origin fetch on a detached task.
    ///
    /// On completion the task writes a success into the memory tier and
    /// then the disk tier (a failed persist degrades to a warning),
    /// deregisters the flight, and broadcasts the outcome to every
    /// subscriber. Memory is populated before deregistering; the owner's
    /// re-probe in `get_or_fetch` depends on that order.
    fn spawn_flight<Fut>(&self, key: CacheKey, fut: Fut, sender: broadcast::Sender<FetchOutcome>)
    where
        Fut: Future<Output = std::result::Result<Bytes, BoxError>> + Send + 'static,
    {
        let memory = self.memory.clone();
        let disk = self.disk.clone();
        let inflight = self.inflight.clone();
        let default_ttl = self.config.default_ttl;
        let fetch_timeout = self.config.fetch_timeout;

        tokio::spawn(async move {
            let outcome = match fetch_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(source)) => Err(CacheError::fetch(key.clone(), source)),
                    Err(_) => Err(CacheError::FetchTimeout {
                        key: key.clone(),
                        timeout: limit,
                    }),
                },
                None => fut
                    .await
                    .map_err(|source| CacheError::fetch(key.clone(), source)),
            };

            match &outcome {
                Ok(value) => {
                    memory
                        .write()
                        .await
                        .insert(key.clone(), value.clone(), None);
                    if let Err(e) = disk.save(&key, value, default_ttl).await {
                        warn!(key = %key, error = %e, "fetched value not persisted to disk tier");
                    }
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "origin fetch failed, caching nothing");
                }
            }

            if let Ok(mut registry) = inflight.lock() {
                registry.remove(&key);
            }
            let _ = sender.send(outcome);
        });
    }

    /// Awaits the shared outcome of a flight.
    async fn await_outcome(receiver: &mut broadcast::Receiver<FetchOutcome>) -> Result<Bytes> {
        match receiver.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(CacheError::Internal(
                "fetch completed without broadcasting an outcome".to_string(),
            )),
        }
    }

    /// Removes a flight from the registry.
    fn deregister(&self, key: &CacheKey) {
        if let Ok(mut registry) = self.inflight.lock() {
            registry.remove(key);
        }
    }

    // == Put ==
    /// Pre-warms both tiers with a value.
    ///
    /// The memory write is unconditional. A failing disk save is returned
    /// after the memory tier was updated; callers may ignore it, the cache
    /// stays best-effort.
    ///
    /// # Errors
    /// `CacheError::InvalidConfig` for a zero TTL, `CacheError::Io` if the
    /// disk save failed.
    pub async fn put(&self, key: CacheKey, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        if let Some(ttl) = ttl {
            if ttl.is_zero() {
                return Err(CacheError::InvalidConfig(
                    "ttl must be greater than zero".to_string(),
                ));
            }
        }
        let effective_ttl = ttl.unwrap_or(self.config.default_ttl);

        self.memory
            .write()
            .await
            .insert(key.clone(), value.clone(), Some(effective_ttl));
        self.disk.save(&key, &value, effective_ttl).await
    }

    // == Remove ==
    /// Removes a key from both tiers. Unknown keys are a no-op.
    pub async fn remove(&self, key: &CacheKey) {
        self.memory.write().await.remove(key);
        if let Err(e) = self.disk.remove(key).await {
            warn!(key = %key, error = %e, "disk tier removal failed");
        }
    }

    // == Clear ==
    /// Empties both tiers. Idempotent.
    pub async fn clear(&self) {
        self.memory.write().await.clear();
        if let Err(e) = self.disk.clear().await {
            warn!(error = %e, "disk tier clear failed");
        }
    }

    // == Purge ==
    /// Drops every memory-tier entry in response to memory pressure.
    ///
    /// Platform integration shims call this from their low-memory
    /// notification. The disk tier is unaffected; purged entries remain
    /// loadable from disk.
    pub async fn purge(&self) {
        self.memory.write().await.purge();
    }

    // == Stats ==
    /// Returns a snapshot of the memory tier's statistics.
    pub async fn stats(&self) -> CacheStats {
        self.memory.read().await.stats()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.sweep_handle.abort();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn cache(dir: &tempfile::TempDir) -> Cache {
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..CacheConfig::default()
        };
        Cache::new(config).await.unwrap()
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    fn payload(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;

        cache.put(key("k"), payload("v"), None).await.unwrap();

        assert_eq!(cache.get(&key("k")).await, Some(payload("v")));
    }

    #[tokio::test]
    async fn test_get_miss_without_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;

        assert_eq!(cache.get(&key("ghost")).await, None);
    }

    #[tokio::test]
    async fn test_put_rejects_zero_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;

        let result = cache
            .put(key("k"), payload("v"), Some(Duration::ZERO))
            .await;

        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
        assert_eq!(cache.get(&key("k")).await, None);
    }

    #[tokio::test]
    async fn test_get_or_fetch_populates_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;

        let value = cache
            .get_or_fetch(&key("k"), |_| async { Ok(payload("fetched")) })
            .await
            .unwrap();
        assert_eq!(value, payload("fetched"));

        // Memory hit
        assert_eq!(cache.get(&key("k")).await, Some(payload("fetched")));

        // Disk copy survives a purge
        cache.purge().await;
        assert_eq!(cache.get(&key("k")).await, Some(payload("fetched")));
    }

    #[tokio::test]
    async fn test_cached_value_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;
        let calls = Arc::new(AtomicUsize::new(0));

        cache.put(key("k"), payload("warm"), None).await.unwrap();

        let counter = calls.clone();
        let value = cache
            .get_or_fetch(&key("k"), move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(payload("cold"))
            })
            .await
            .unwrap();

        assert_eq!(value, payload("warm"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;

        let result = cache
            .get_or_fetch(&key("k"), |_| async {
                Err::<Bytes, BoxError>("origin down".into())
            })
            .await;
        assert!(matches!(result, Err(CacheError::Fetch { .. })));
        assert_eq!(cache.get(&key("k")).await, None);

        // The registry entry is gone, so a later caller fetches again
        let value = cache
            .get_or_fetch(&key("k"), |_| async { Ok(payload("recovered")) })
            .await
            .unwrap();
        assert_eq!(value, payload("recovered"));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            fetch_timeout: Some(Duration::from_millis(50)),
            ..CacheConfig::default()
        };
        let cache = Cache::new(config).await.unwrap();

        let result = cache
            .get_or_fetch(&key("slow"), |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(payload("never"))
            })
            .await;

        assert!(matches!(result, Err(CacheError::FetchTimeout { .. })));
        assert_eq!(cache.get(&key("slow")).await, None);
    }

    #[tokio::test]
    async fn test_remove_and_clear_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir).await;

        cache.put(key("k"), payload("v"), None).await.unwrap();

        cache.remove(&key("k")).await;
        cache.remove(&key("k")).await;
        assert_eq!(cache.get(&key("k")).await, None);

        cache.put(key("k2"), payload("v"), None).await.unwrap();
        cache.clear().await;
        cache.clear().await;
        assert_eq!(cache.get(&key("k2")).await, None);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            memory_max_entries: 0,
            ..CacheConfig::default()
        };

        assert!(matches!(
            Cache::new(config).await,
            Err(CacheError::InvalidConfig(_))
        ));
    }
}
