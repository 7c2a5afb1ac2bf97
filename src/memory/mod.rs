//! Memory Tier Module
//!
//! Provides the in-process hot tier: bounded storage with TTL expiration
//! and policy-driven eviction.

mod eviction;
mod store;


// Re-export public types
pub use eviction::EvictionQueue;
pub use store::MemoryCache;
