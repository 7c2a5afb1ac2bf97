//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment
//! variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Eviction Policy ==
/// Ordering used when the memory tier evicts under capacity pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict the least recently used entry first
    #[default]
    Lru,
    /// Evict the least frequently used entry first
    Lfu,
    /// Evict the earliest inserted entry first
    Fifo,
    /// Evict the soonest-expiring entry first
    TtlOnly,
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "fifo" => Ok(Self::Fifo),
            "ttl" | "ttl_only" => Ok(Self::TtlOnly),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
            Self::TtlOnly => "ttl_only",
        };
        f.write_str(name)
    }
}

// == Cache Config ==
/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. The configuration is immutable once a cache has been built
/// from it.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for the disk tier
    pub cache_dir: PathBuf,
    /// Maximum number of entries the memory tier can hold
    pub memory_max_entries: usize,
    /// Maximum total payload bytes the memory tier can hold
    pub memory_max_bytes: usize,
    /// Maximum number of entries the disk tier can hold
    pub disk_max_entries: usize,
    /// Maximum total payload bytes the disk tier can hold
    pub disk_max_bytes: u64,
    /// TTL applied to entries stored without an explicit TTL
    pub default_ttl: Duration,
    /// Interval between background sweep runs
    pub sweep_interval: Duration,
    /// Upper bound on a single origin fetch, None = wait indefinitely
    pub fetch_timeout: Option<Duration>,
    /// Eviction ordering for the memory tier
    pub eviction_policy: EvictionPolicy,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATACACHE_DIR` - Disk tier root directory (default: `<tmp>/stratacache`)
    /// - `STRATACACHE_MEMORY_MAX_ENTRIES` - Memory entry capacity (default: 1024)
    /// - `STRATACACHE_MEMORY_MAX_BYTES` - Memory byte capacity (default: 64 MiB)
    /// - `STRATACACHE_DISK_MAX_ENTRIES` - Disk entry capacity (default: 16384)
    /// - `STRATACACHE_DISK_MAX_BYTES` - Disk byte capacity (default: 1 GiB)
    /// - `STRATACACHE_DEFAULT_TTL_SECS` - Default TTL in seconds (default: 300)
    /// - `STRATACACHE_SWEEP_INTERVAL_SECS` - Sweep frequency in seconds (default: 60)
    /// - `STRATACACHE_FETCH_TIMEOUT_SECS` - Fetch timeout in seconds (default: none)
    /// - `STRATACACHE_EVICTION_POLICY` - `lru`, `lfu`, `fifo`, or `ttl` (default: lru)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("STRATACACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            memory_max_entries: env::var("STRATACACHE_MEMORY_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_max_entries),
            memory_max_bytes: env::var("STRATACACHE_MEMORY_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_max_bytes),
            disk_max_entries: env::var("STRATACACHE_DISK_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.disk_max_entries),
            disk_max_bytes: env::var("STRATACACHE_DISK_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.disk_max_bytes),
            default_ttl: env::var("STRATACACHE_DEFAULT_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            sweep_interval: env::var("STRATACACHE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            fetch_timeout: env::var("STRATACACHE_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
            eviction_policy: env::var("STRATACACHE_EVICTION_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.eviction_policy),
        }
    }

    // == Validation ==
    /// Checks the configuration for values the cache cannot operate with.
    ///
    /// # Returns
    /// `CacheError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache_dir must not be empty".to_string(),
            ));
        }
        if self.memory_max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "memory_max_entries must be greater than zero".to_string(),
            ));
        }
        if self.memory_max_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "memory_max_bytes must be greater than zero".to_string(),
            ));
        }
        if self.disk_max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "disk_max_entries must be greater than zero".to_string(),
            ));
        }
        if self.disk_max_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "disk_max_bytes must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if let Some(timeout) = self.fetch_timeout {
            if timeout.is_zero() {
                return Err(CacheError::InvalidConfig(
                    "fetch_timeout must be greater than zero when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: env::temp_dir().join("stratacache"),
            memory_max_entries: 1024,
            memory_max_bytes: 64 * 1024 * 1024,
            disk_max_entries: 16384,
            disk_max_bytes: 1024 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            fetch_timeout: None,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}
