//! Scaffold Cache - embedded cache engine for the scaffolding CLI
//!
//! Caches tool-discovery probes, version lookups and audit results with TTL
//! expiry, pluggable eviction and single-file persistence.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;

pub use cache::{CacheEntry, CacheManager, CacheStats, CacheValue};
pub use config::{CacheConfig, EvictionPolicy};
pub use error::{CacheError, Result};
