//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Sweep: reclaims expired and over-budget entries from both tiers at
//!   configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
