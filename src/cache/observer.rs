//! Cache event observers.
//!
//! Callbacks run synchronously while the manager's lock is held, so an
//! observer must never call back into the manager.

use std::fmt;

use tracing::{debug, trace};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Explicit delete
    Manual,
    /// TTL elapsed
    Ttl,
    /// Total size limit reached
    Size,
    /// Entry count limit reached
    Capacity,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Manual => "manual",
            EvictionReason::Ttl => "ttl",
            EvictionReason::Size => "size",
            EvictionReason::Capacity => "capacity",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives hit, miss and eviction notifications.
pub trait CacheObserver: Send + Sync {
    fn on_hit(&self, _key: &str) {}

    fn on_miss(&self, _key: &str) {}

    fn on_eviction(&self, _key: &str, _reason: EvictionReason) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn on_hit(&self, key: &str) {
        trace!(key, "cache hit");
    }

    fn on_miss(&self, key: &str) {
        trace!(key, "cache miss");
    }

    fn on_eviction(&self, key: &str, reason: EvictionReason) {
        debug!(key, %reason, "cache entry evicted");
    }
}
