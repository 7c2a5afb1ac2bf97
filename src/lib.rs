//! stratacache - A two-tier content cache with request coalescing
//!
//! Provides a memory tier (TTL expiration, policy eviction) over a
//! persistent disk tier (JSON metadata sidecars, crash-recovery sweep),
//! fronted by a coordinator that coalesces concurrent origin fetches so
//! each missing key is fetched at most once.
//!
//! # Example
//! ```no_run
//! use bytes::Bytes;
//! use stratacache::{Cache, CacheConfig, CacheKey};
//!
//! # async fn run() -> stratacache::Result<()> {
//! let cache = Cache::new(CacheConfig::default()).await?;
//!
//! let value = cache
//!     .get_or_fetch(&CacheKey::new("greeting"), |_key| async {
//!         Ok(Bytes::from_static(b"hello"))
//!     })
//!     .await?;
//! assert_eq!(value, Bytes::from_static(b"hello"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod disk;
pub mod entry;
pub mod error;
pub mod key;
pub mod memory;
pub mod stats;
pub mod tasks;

pub use config::{CacheConfig, EvictionPolicy};
pub use coordinator::Cache;
pub use disk::DiskCache;
pub use error::{BoxError, CacheError, Result};
pub use key::CacheKey;
pub use memory::MemoryCache;
pub use stats::CacheStats;
pub use tasks::spawn_sweep_task;
