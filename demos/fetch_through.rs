//! Fetch-through demo
//!
//! Walks the full coordinator path: pre-warm, coalesced fetch-through on a
//! miss, disk promotion after a memory purge, and a stats snapshot.
//!
//! Run with: `cargo run --example fetch_through`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use stratacache::{Cache, CacheConfig, CacheKey};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stratacache=info,fetch_through=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = CacheConfig::from_env();
    info!(
        dir = %config.cache_dir.display(),
        memory_max_entries = config.memory_max_entries,
        default_ttl_secs = config.default_ttl.as_secs(),
        policy = %config.eviction_policy,
        "configuration loaded"
    );

    let cache = Arc::new(Cache::new(config).await?);

    // Pre-warm a key directly
    cache
        .put(
            CacheKey::new("motd"),
            Bytes::from_static(b"welcome back"),
            Some(Duration::from_secs(60)),
        )
        .await?;
    info!("pre-warmed 'motd'");

    // Eight concurrent callers for the same uncached key; the fetcher
    // runs once and everyone shares its result
    let fetches = Arc::new(AtomicUsize::new(0));
    let mut callers = Vec::new();
    for n in 0..8 {
        let cache = cache.clone();
        let fetches = fetches.clone();
        callers.push(tokio::spawn(async move {
            let value = cache
                .get_or_fetch(&CacheKey::new("report/today"), move |key| async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    info!(key = %key, "origin fetch running");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(Bytes::from_static(b"42 widgets shipped"))
                })
                .await?;
            info!(caller = n, ?value, "resolved");
            Ok::<_, anyhow::Error>(())
        }));
    }
    for caller in callers {
        caller.await??;
    }
    info!(
        origin_fetches = fetches.load(Ordering::SeqCst),
        "coalesced fetch-through complete"
    );

    // Simulate memory pressure; the next get is served from disk
    cache.purge().await;
    let promoted = cache.get(&CacheKey::new("report/today")).await;
    info!(hit = promoted.is_some(), "after purge, served from disk");

    let stats = cache.stats().await;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.total_entries,
        hit_rate = format!("{:.2}", stats.hit_rate()),
        "memory tier stats"
    );

    Ok(())
}
