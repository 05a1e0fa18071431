//! Entry Store Module
//!
//! In-memory entry map with metrics, TTL bookkeeping, policy-driven
//! eviction and diagnostic scans.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use crate::cache::eviction;
use crate::cache::{
    CacheEntry, CacheMetrics, CacheObserver, CacheValue, EvictionReason, NoopObserver,
    COMPRESSION_THRESHOLD,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Entry Store ==
/// Live entry map and store-wide metrics.
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    metrics: CacheMetrics,
    config: CacheConfig,
    observer: Arc<dyn CacheObserver>,
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("entries", &self.entries.len())
            .field("metrics", &self.metrics)
            .field("config", &self.config)
            .finish()
    }
}

impl EntryStore {
    // == Constructor ==
    /// Creates an empty store that ignores cache events.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    pub fn with_observer(config: CacheConfig, observer: Arc<dyn CacheObserver>) -> Self {
        Self {
            entries: HashMap::new(),
            metrics: CacheMetrics::new(),
            config,
            observer,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CacheConfig) {
        self.config = config;
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn entries(&self) -> &HashMap<String, CacheEntry> {
        &self.entries
    }

    // == Load ==
    /// Replaces the live map, keeping counters and recomputing the gauges.
    pub fn replace_entries(&mut self, entries: HashMap<String, CacheEntry>) {
        self.entries = entries;
        self.recompute_gauges();
    }

    /// Replaces both the live map and the metrics, e.g. after a disk load.
    pub fn restore(&mut self, entries: HashMap<String, CacheEntry>, metrics: CacheMetrics) {
        self.entries = entries;
        self.metrics = metrics;
        self.recompute_gauges();
    }

    fn recompute_gauges(&mut self) {
        let size = self.entries.values().map(|e| e.size).sum();
        self.metrics.set_gauges(size, self.entries.len());
    }

    // == Get ==
    /// Looks up a live entry and records the access.
    ///
    /// Expired entries are removed on sight and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let expired = match self.entries.get(key) {
            None => {
                self.metrics.record_miss();
                self.observer.on_miss(key);
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            if let Some(entry) = self.entries.remove(key) {
                debug!(key, "lazily expired cache entry");
                self.metrics.record_eviction(entry.size);
                self.observer.on_eviction(key, EvictionReason::Ttl);
            }
            self.metrics.record_miss();
            self.observer.on_miss(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.touch();
        let found = entry.clone();
        self.metrics.record_hit();
        self.observer.on_hit(key);
        Some(found)
    }

    /// Reads an entry without touching access bookkeeping or metrics.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Create ==
    /// Builds a new entry for `value` without inserting it.
    ///
    /// Large values are compressed when enabled; a failed compression only
    /// logs a warning and keeps the value as is.
    pub fn create(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheEntry {
        let mut entry = CacheEntry::new(key, value, ttl, self.config.default_ttl);

        if self.config.enable_compression && entry.size > COMPRESSION_THRESHOLD {
            match entry.try_compress(self.config.compression_type, self.config.compression_level)
            {
                Ok(true) => debug!(
                    key,
                    original = entry.original_size(),
                    compressed = entry.size,
                    "compressed cache value"
                ),
                Ok(false) => debug!(key, "compression not profitable, storing raw value"),
                Err(err) => warn!(key, error = %err, "failed to compress cache value"),
            }
        }

        entry
    }

    // == Set ==
    /// Creates and inserts an entry, evicting first if limits require it.
    ///
    /// An existing entry under the same key is replaced by a brand-new one.
    pub fn set(&mut self, key: &str, value: CacheValue, ttl: Duration) -> CacheEntry {
        let entry = self.create(key, value, ttl);

        if let Some(old) = self.entries.remove(key) {
            self.metrics.record_removal(old.size);
        }
        self.evict_if_needed(entry.size);

        self.metrics.record_insert(entry.size);
        self.entries.insert(key.to_string(), entry.clone());
        entry
    }

    // == Delete ==
    /// Removes an entry by key.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        self.metrics.record_delete(entry.size);
        self.observer.on_eviction(key, EvictionReason::Manual);
        Ok(())
    }

    /// Drops every entry, zeroing the gauges.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.metrics.set_gauges(0, 0);
    }

    // == Clean Expired ==
    /// Removes all expired entries and returns their keys.
    pub fn clean_expired(&mut self) -> Vec<String> {
        let now = Utc::now();
        let mut expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        expired.sort();

        for key in &expired {
            if let Some(entry) = self.entries.remove(key) {
                self.metrics.record_eviction(entry.size);
                self.observer.on_eviction(key, EvictionReason::Ttl);
            }
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "removed expired cache entries");
        }
        expired
    }

    // == Evict If Needed ==
    /// Makes room for an incoming entry of `incoming_size` bytes.
    ///
    /// Evicts down to a target below the limit, `limit * (1 - eviction_ratio)`,
    /// rather than just under it. Returns the evicted keys.
    pub fn evict_if_needed(&mut self, incoming_size: u64) -> Vec<String> {
        let mut evicted = Vec::new();
        let ratio = self.config.eviction_ratio;

        let max_size = self.config.max_size;
        if max_size > 0 && self.metrics.current_size + incoming_size > max_size {
            let target = (max_size as f64 * (1.0 - ratio)) as u64;
            evicted.extend(self.evict_while(EvictionReason::Size, |store| {
                store.metrics.current_size + incoming_size > target
            }));
        }

        let max_entries = self.config.max_entries;
        if max_entries > 0 && self.entries.len() >= max_entries {
            let target = (max_entries as f64 * (1.0 - ratio)).floor() as usize;
            evicted.extend(self.evict_while(EvictionReason::Capacity, |store| {
                store.entries.len() > target
            }));
        }

        evicted
    }

    /// Brings an installed entry set back within the configured limits.
    ///
    /// Unlike [`EntryStore::evict_if_needed`], a store that is exactly full
    /// is left alone since nothing is being inserted.
    pub fn enforce_limits(&mut self) -> Vec<String> {
        let max_size = self.config.max_size;
        let max_entries = self.config.max_entries;
        let over_size = max_size > 0 && self.metrics.current_size > max_size;
        let over_count = max_entries > 0 && self.entries.len() > max_entries;
        if over_size || over_count {
            self.evict_if_needed(0)
        } else {
            Vec::new()
        }
    }

    fn evict_while<F>(&mut self, reason: EvictionReason, over_target: F) -> Vec<String>
    where
        F: Fn(&Self) -> bool,
    {
        let order = eviction::victims(self.config.eviction_policy, self.entries.values());
        let mut evicted = Vec::new();

        for key in order {
            if !over_target(self) {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.metrics.record_eviction(entry.size);
                self.observer.on_eviction(&key, reason);
                evicted.push(key);
            }
        }

        if !evicted.is_empty() {
            debug!(count = evicted.len(), %reason, policy = %self.config.eviction_policy, "evicted cache entries");
        }
        evicted
    }

    // == Key Listings ==
    /// Sorted keys of all non-expired entries.
    pub fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        let mut keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Sorted non-expired keys matching a regular expression.
    pub fn keys_by_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let re = Regex::new(pattern)?;
        Ok(self.keys().into_iter().filter(|k| re.is_match(k)).collect())
    }

    /// Sorted keys whose expiry has passed, without removing them.
    pub fn expired_keys(&self) -> Vec<String> {
        let now = Utc::now();
        let mut keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    // == TTL ==
    pub fn update_ttl(&mut self, key: &str, ttl: Duration) -> Result<()> {
        let entry = self.entry_mut(key)?;
        entry.set_ttl(ttl);
        Ok(())
    }

    /// Remaining lifetime; zero both for "no expiry" and "already expired".
    pub fn get_ttl(&self, key: &str) -> Result<Duration> {
        self.entries
            .get(key)
            .map(CacheEntry::ttl_remaining)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    pub fn refresh_ttl(&mut self, key: &str) -> Result<()> {
        let entry = self.entry_mut(key)?;
        entry.refresh();
        Ok(())
    }

    fn entry_mut(&mut self, key: &str) -> Result<&mut CacheEntry> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    // == Validation ==
    /// Lists consistency problems as human-readable strings.
    pub fn validate_entries(&self) -> Vec<String> {
        let now = Utc::now();
        let mut issues = Vec::new();
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        for map_key in keys {
            let entry = &self.entries[map_key];
            if entry.key != *map_key {
                issues.push(format!(
                    "key mismatch: map key {} holds entry {}",
                    map_key, entry.key
                ));
            }
            if entry.size == 0 && entry.value.estimated_size() > 0 {
                issues.push(format!("invalid size for key {}: 0", map_key));
            }
            if entry.created_at > now {
                issues.push(format!("future creation time for key {}", map_key));
            }
            if entry.updated_at > now || entry.accessed_at > now {
                issues.push(format!("future update or access time for key {}", map_key));
            }
            if entry.created_at > entry.updated_at {
                issues.push(format!("creation after update for key {}", map_key));
            }
            if entry.compressed && entry.original_size().is_none() {
                issues.push(format!("missing original size for compressed key {}", map_key));
            }
        }

        issues
    }

    // == Repair ==
    /// Returns a repaired copy of the entry map.
    ///
    /// Expired entries are dropped; the rest get their key, size and
    /// timestamps fixed. Metrics are not touched.
    pub fn repair_entries(&self) -> HashMap<String, CacheEntry> {
        let now = Utc::now();
        let mut repaired = HashMap::with_capacity(self.entries.len());

        for (map_key, entry) in &self.entries {
            if entry.is_expired_at(now) {
                continue;
            }
            if entry.compressed && entry.decoded_value().is_err() {
                warn!(key = %map_key, "dropping undecodable compressed entry");
                continue;
            }

            let mut fixed = entry.clone();
            if fixed.key != *map_key {
                fixed.key = map_key.clone();
            }
            if fixed.size == 0 {
                fixed.size = fixed.value.estimated_size();
            }
            if fixed.created_at > now {
                fixed.created_at = now;
            }
            if fixed.updated_at > now {
                fixed.updated_at = now;
            }
            if fixed.accessed_at > now {
                fixed.accessed_at = now;
            }
            if fixed.created_at > fixed.updated_at {
                fixed.updated_at = fixed.created_at;
            }
            repaired.insert(map_key.clone(), fixed);
        }

        repaired
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
