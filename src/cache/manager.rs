//! Cache Manager Module
//!
//! Concurrency-safe façade binding the entry store and the durable store
//! behind one lock. This is the only type callers outside the cache depend on.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cache::{
    CacheEntry, CacheObserver, CacheStats, CacheValue, DurableStore, EntryStore, NoopObserver,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Manager State ==
/// Everything guarded by the manager lock.
#[derive(Debug)]
struct ManagerState {
    store: EntryStore,
    storage: DurableStore,
}

impl ManagerState {
    /// Persists the current state if the configuration asks for it.
    fn persist(&mut self) -> Result<()> {
        let ManagerState { store, storage } = self;
        storage.save(store.entries(), store.metrics()).map_err(|err| {
            warn!(error = %err, "failed to persist cache");
            err
        })
    }
}

// == Cache Manager ==
/// Thread-safe cache handle.
///
/// Every mutating call takes the write lock. `get` does too, because it
/// records access bookkeeping.
#[derive(Debug)]
pub struct CacheManager {
    state: RwLock<ManagerState>,
    location: PathBuf,
    offline: AtomicBool,
}

impl CacheManager {
    // == Constructor ==
    /// Opens (or creates) the cache stored under `dir`.
    pub fn new(dir: impl Into<PathBuf>, config: CacheConfig) -> Result<Self> {
        Self::with_observer(dir, config, Arc::new(NoopObserver))
    }

    /// Opens the cache and routes hit/miss/eviction events to `observer`.
    ///
    /// The observer runs under the manager lock and must not call back into
    /// the manager.
    pub fn with_observer(
        dir: impl Into<PathBuf>,
        config: CacheConfig,
        observer: Arc<dyn CacheObserver>,
    ) -> Result<Self> {
        config.validate()?;
        let location = dir.into();

        let mut storage = DurableStore::new(&location, config.clone());
        storage.initialize()?;
        let snapshot = storage.load()?;

        let mut store = EntryStore::with_observer(config, observer);
        store.restore(snapshot.entries, snapshot.metrics);
        // limits may have tightened since the file was written
        store.enforce_limits();
        info!(
            location = %location.display(),
            entries = store.len(),
            "cache manager ready"
        );

        Ok(Self {
            state: RwLock::new(ManagerState { store, storage }),
            location,
            offline: AtomicBool::new(false),
        })
    }

    // == Core Operations ==
    /// Returns a live entry, recording the access.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.state.write().store.get(key)
    }

    /// Returns the decompressed value of a live entry.
    pub fn get_value(&self, key: &str) -> Result<Option<CacheValue>> {
        self.get(key).map(|e| e.decoded_value()).transpose()
    }

    /// Stores a value; a zero `ttl` uses the configured default.
    ///
    /// A failed save is returned but the in-memory write stands.
    pub fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: Duration) -> Result<()> {
        let mut state = self.state.write();
        state.store.set(key, value.into(), ttl);
        state.persist()
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();
        state.store.delete(key)?;
        state.persist()
    }

    /// Drops every entry and removes the cache file.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.store.clear();
        state.storage.clear()
    }

    /// Sweeps expired entries and returns their keys.
    pub fn clean(&self) -> Result<Vec<String>> {
        let mut state = self.state.write();
        let removed = state.store.clean_expired();
        if !removed.is_empty() {
            state.persist()?;
        }
        Ok(removed)
    }

    /// Writes the cache file now.
    pub fn save(&self) -> Result<()> {
        self.state.write().persist()
    }

    // == Introspection ==
    pub fn get_stats(&self) -> CacheStats {
        let state = self.state.read();
        let metrics = state.store.metrics().clone();
        let config = state.store.config();

        CacheStats {
            hit_rate: metrics.hit_rate(),
            metrics,
            default_ttl_secs: config.default_ttl.as_secs(),
            max_size: config.max_size,
            max_entries: config.max_entries,
            eviction_policy: config.eviction_policy,
            compression_enabled: config.enable_compression,
            persist_to_disk: config.persist_to_disk,
            cache_file: state.storage.file_path().to_path_buf(),
            last_saved: state.storage.last_saved(),
            offline_mode: self.is_offline_mode(),
        }
    }

    /// Sum of entry sizes in bytes.
    pub fn get_size(&self) -> u64 {
        self.state.read().store.metrics().current_size
    }

    pub fn get_location(&self) -> &Path {
        &self.location
    }

    pub fn config(&self) -> CacheConfig {
        self.state.read().store.config().clone()
    }

    /// Swaps the configuration and applies the new limits immediately.
    pub fn set_config(&self, config: CacheConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.state.write();
        state.store.set_config(config.clone());
        state.storage.set_config(config);
        state.store.enforce_limits();
        state.persist()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.read().store.keys()
    }

    pub fn keys_by_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        self.state.read().store.keys_by_pattern(pattern)
    }

    pub fn expired_keys(&self) -> Vec<String> {
        self.state.read().store.expired_keys()
    }

    // == TTL ==
    pub fn update_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.write();
        state.store.update_ttl(key, ttl)?;
        state.persist()
    }

    pub fn get_ttl(&self, key: &str) -> Result<Duration> {
        self.state.read().store.get_ttl(key)
    }

    pub fn refresh_ttl(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();
        state.store.refresh_ttl(key)?;
        state.persist()
    }

    // == Diagnostics ==
    /// Fails with every entry issue found, or if storage is not writable.
    pub fn validate_cache(&self) -> Result<()> {
        let state = self.state.read();
        let issues = state.store.validate_entries();
        if !issues.is_empty() {
            return Err(CacheError::Validation(issues));
        }
        state.storage.validate_storage()
    }

    /// Replaces the live map with its repaired form and persists it.
    ///
    /// Returns how many entries were dropped.
    pub fn repair_cache(&self) -> Result<usize> {
        let mut state = self.state.write();
        let before = state.store.len();
        let repaired = state.store.repair_entries();
        let dropped = before - repaired.len();
        state.store.replace_entries(repaired);
        if dropped > 0 {
            info!(dropped, "repair dropped cache entries");
        }
        state.persist()?;
        Ok(dropped)
    }

    // == Backup / Restore ==
    /// Writes the live entries to a validated backup path.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let state = self.state.read();
        state
            .storage
            .backup(path, state.store.entries(), state.store.metrics())
    }

    /// Replaces the live entries with those of a backup file, then applies
    /// the configured limits.
    ///
    /// Returns the number of entries read from the backup.
    pub fn import(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut state = self.state.write();
        let snapshot = state.storage.restore(path)?;
        let count = snapshot.entries.len();
        state.store.replace_entries(snapshot.entries);
        state.store.enforce_limits();
        state.persist()?;
        Ok(count)
    }

    // == Offline Mode ==
    pub fn enable_offline_mode(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn disable_offline_mode(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Whether callers should avoid live probes; the cache itself ignores it.
    pub fn is_offline_mode(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}
