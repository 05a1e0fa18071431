//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions,
//! and the snapshot handed out by the manager.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EvictionPolicy;

// == Cache Metrics ==
/// Store-wide counters plus point-in-time gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheMetrics {
    /// Sum of entry sizes in bytes
    pub current_size: u64,
    /// Number of live entries
    pub current_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    // == Constructor ==
    /// Creates a new CacheMetrics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.gets += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.gets += 1;
    }

    /// Accounts for a newly inserted entry.
    pub fn record_insert(&mut self, size: u64) {
        self.sets += 1;
        self.current_size += size;
        self.current_entries += 1;
    }

    /// Accounts for an entry leaving the map for any reason.
    pub fn record_removal(&mut self, size: u64) {
        self.current_size = self.current_size.saturating_sub(size);
        self.current_entries = self.current_entries.saturating_sub(1);
    }

    pub fn record_delete(&mut self, size: u64) {
        self.record_removal(size);
        self.deletes += 1;
    }

    pub fn record_eviction(&mut self, size: u64) {
        self.record_removal(size);
        self.evictions += 1;
    }

    /// Resets the gauges to the given totals, keeping the counters.
    pub fn set_gauges(&mut self, size: u64, entries: usize) {
        self.current_size = size;
        self.current_entries = entries;
    }
}

// == Cache Stats ==
/// Snapshot combining live metrics with configuration-derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    #[serde(flatten)]
    pub metrics: CacheMetrics,
    pub hit_rate: f64,
    /// Default TTL in seconds
    pub default_ttl_secs: u64,
    pub max_size: u64,
    pub max_entries: usize,
    pub eviction_policy: EvictionPolicy,
    pub compression_enabled: bool,
    pub persist_to_disk: bool,
    pub cache_file: PathBuf,
    pub last_saved: Option<DateTime<Utc>>,
    pub offline_mode: bool,
}
