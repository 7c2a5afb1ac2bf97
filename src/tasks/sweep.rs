//! Sweep Task
//!
//! Background task that periodically reclaims expired and over-budget
//! entries from both cache tiers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::disk::DiskCache;
use crate::memory::MemoryCache;

/// Spawns a background task that periodically sweeps both cache tiers.
///
/// Each pass drops the memory tier's expired entries and runs the disk
/// tier's full sweep (expiry, integrity, budget enforcement). Correctness
/// never depends on the task running; the memory tier expires lazily on
/// `get` and the disk tier validates on `load`. The sweep only bounds how
/// long stale data occupies resources.
///
/// # Arguments
/// * `memory` - Shared memory tier
/// * `disk` - Shared disk tier
/// * `interval` - Time between sweep passes
///
/// # Returns
/// A JoinHandle the owner aborts during shutdown.
pub fn spawn_sweep_task(
    memory: Arc<RwLock<MemoryCache>>,
    disk: Arc<DiskCache>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval = ?interval, "sweep task started");

        loop {
            tokio::time::sleep(interval).await;

            let memory_expired = {
                let mut memory_guard = memory.write().await;
                memory_guard.cleanup_expired()
            };

            let disk_stats = disk.sweep().await;

            let removed = memory_expired + disk_stats.total_removed();
            if removed > 0 {
                info!(
                    memory_expired,
                    disk_expired = disk_stats.expired,
                    disk_corrupted = disk_stats.corrupted,
                    disk_orphaned = disk_stats.orphaned,
                    disk_evicted = disk_stats.evicted,
                    "sweep reclaimed entries"
                );
            } else {
                debug!("sweep found nothing to reclaim");
            }
        }
    })
}
