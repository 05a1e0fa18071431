//! Durable Store Module
//!
//! Reads and writes the full entry set and metrics as one versioned JSON
//! file, plus backup/restore to validated caller-chosen paths.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheMetrics};
use crate::config::CacheConfig;
use crate::error::{CacheError, IoResultExt, Result};

/// Version tag written into every cache file.
pub const FORMAT_VERSION: &str = "1.0";

/// Name of the cache file inside the cache directory.
pub const CACHE_FILE_NAME: &str = "cache.json";

const PROBE_FILE_NAME: &str = ".write_test";

const PROTECTED_PREFIXES: [&str; 3] = ["/etc/", "/proc/", "/sys/"];

// == Cache File Envelope ==
/// On-disk representation of the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub config: CacheConfig,
    #[serde(default)]
    pub entries: HashMap<String, CacheEntry>,
    #[serde(default)]
    pub metrics: CacheMetrics,
}

/// Entries and metrics read back from disk.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: HashMap<String, CacheEntry>,
    pub metrics: CacheMetrics,
}

// == Durable Store ==
/// Single-file persistence for the entry store.
#[derive(Debug, Clone)]
pub struct DurableStore {
    dir: PathBuf,
    file_path: PathBuf,
    config: CacheConfig,
    created_at: Option<DateTime<Utc>>,
    last_saved: Option<DateTime<Utc>>,
}

impl DurableStore {
    pub fn new(dir: impl Into<PathBuf>, config: CacheConfig) -> Self {
        let dir = dir.into();
        let file_path = dir.join(CACHE_FILE_NAME);
        Self {
            dir,
            file_path,
            config,
            created_at: None,
            last_saved: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn set_config(&mut self, config: CacheConfig) {
        self.config = config;
    }

    // == Initialize ==
    /// Creates the cache directory and checks that it is writable.
    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).context("failed to create cache directory")?;
        probe_writable(&self.dir)
    }

    /// Checks that the cache directory exists and is writable.
    pub fn validate_storage(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(CacheError::io(
                "cache directory does not exist",
                io::Error::new(io::ErrorKind::NotFound, self.dir.display().to_string()),
            ));
        }
        probe_writable(&self.dir)
    }

    // == Load ==
    /// Reads the cache file, dropping entries that expired while on disk.
    ///
    /// A missing file yields an empty snapshot.
    pub fn load(&mut self) -> Result<Snapshot> {
        if !self.file_path.exists() {
            debug!(path = %self.file_path.display(), "no cache file, starting empty");
            return Ok(Snapshot::default());
        }

        let file = read_cache_file(&self.file_path)?;
        self.created_at = Some(file.created_at);
        let snapshot = live_snapshot(file);
        info!(
            path = %self.file_path.display(),
            entries = snapshot.entries.len(),
            "loaded cache from disk"
        );
        Ok(snapshot)
    }

    // == Save ==
    /// Writes the envelope to the cache file; a no-op when persistence is off.
    pub fn save(
        &mut self,
        entries: &HashMap<String, CacheEntry>,
        metrics: &CacheMetrics,
    ) -> Result<()> {
        if !self.config.persist_to_disk {
            return Ok(());
        }

        let now = Utc::now();
        let created_at = *self.created_at.get_or_insert(now);
        let file = self.envelope(created_at, now, entries, metrics);

        // write beside the target, then swap it in
        let tmp_path = self.file_path.with_extension("json.tmp");
        let written = write_cache_file(&tmp_path, &file).and_then(|()| {
            fs::rename(&tmp_path, &self.file_path).context("failed to replace cache file")
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        self.last_saved = Some(now);
        debug!(path = %self.file_path.display(), entries = entries.len(), "saved cache to disk");
        Ok(())
    }

    // == Clear ==
    /// Removes the cache file; a missing file is not an error.
    pub fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.file_path) {
            Ok(()) => {
                self.created_at = None;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::io("failed to remove cache file", err)),
        }
    }

    // == Backup / Restore ==
    /// Writes the envelope to an arbitrary validated path.
    pub fn backup(
        &self,
        path: impl AsRef<Path>,
        entries: &HashMap<String, CacheEntry>,
        metrics: &CacheMetrics,
    ) -> Result<PathBuf> {
        let path = validate_path(path.as_ref())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("failed to create backup directory")?;
        }

        let now = Utc::now();
        let file = self.envelope(now, now, entries, metrics);
        write_cache_file(&path, &file)?;
        info!(path = %path.display(), entries = entries.len(), "cache backup written");
        Ok(path)
    }

    /// Reads an envelope from an arbitrary validated path.
    pub fn restore(&self, path: impl AsRef<Path>) -> Result<Snapshot> {
        let path = validate_path(path.as_ref())?;
        let file = read_cache_file(&path)?;
        let snapshot = live_snapshot(file);
        info!(path = %path.display(), entries = snapshot.entries.len(), "cache backup restored");
        Ok(snapshot)
    }

    fn envelope(
        &self,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        entries: &HashMap<String, CacheEntry>,
        metrics: &CacheMetrics,
    ) -> CacheFile {
        CacheFile {
            version: FORMAT_VERSION.to_string(),
            created_at,
            updated_at,
            config: self.config.clone(),
            entries: entries.clone(),
            metrics: metrics.clone(),
        }
    }
}

// == Path Validation ==
/// Cleans a backup/restore path and rejects traversal and system directories.
pub fn validate_path(path: &Path) -> Result<PathBuf> {
    let cleaned = clean_path(path);

    if cleaned
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(CacheError::PathTraversal(path.display().to_string()));
    }

    if cleaned.is_absolute() {
        let text = cleaned.to_string_lossy();
        if PROTECTED_PREFIXES.iter().any(|p| text.starts_with(p)) {
            return Err(CacheError::SystemDirectory(path.display().to_string()));
        }
    }

    Ok(cleaned)
}

/// Lexically resolves `.` and `..` segments without touching the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // ".." at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

// == File Helpers ==
fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(PROBE_FILE_NAME);
    fs::write(&probe, b"ok").context("cache directory is not writable")?;
    fs::remove_file(&probe).context("failed to remove write probe")?;
    Ok(())
}

fn read_cache_file(path: &Path) -> Result<CacheFile> {
    let file = File::open(path).context("failed to open cache file")?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_cache_file(path: &Path, contents: &CacheFile) -> Result<()> {
    let file = File::create(path).context("failed to create cache file")?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, contents)?;
    writer.flush().context("failed to write cache file")?;
    Ok(())
}

fn live_snapshot(file: CacheFile) -> Snapshot {
    let now = Utc::now();
    let entries = file
        .entries
        .into_iter()
        .filter(|(_, entry)| !entry.is_expired_at(now))
        .collect();
    Snapshot {
        entries,
        metrics: file.metrics,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheValue;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_entries() -> HashMap<String, CacheEntry> {
        let mut entries = HashMap::new();
        for (key, value) in [("tool:node", "20.11.0"), ("tool:go", "1.22.1")] {
            let entry = CacheEntry::new(key, CacheValue::from(value), Duration::from_secs(600), Duration::ZERO);
            entries.insert(key.to_string(), entry);
        }
        entries
    }

    #[test]
    fn test_validate_path_rules() {
        assert!(matches!(
            validate_path(Path::new("../../etc/passwd")),
            Err(CacheError::PathTraversal(_))
        ));
        assert!(matches!(
            validate_path(Path::new("/etc/passwd")),
            Err(CacheError::SystemDirectory(_))
        ));
        assert!(validate_path(Path::new("/proc/self/environ")).is_err());
        assert!(validate_path(Path::new("/sys/kernel")).is_err());
        assert_eq!(
            validate_path(Path::new("/tmp/backup.json")).unwrap(),
            PathBuf::from("/tmp/backup.json")
        );
        assert_eq!(
            validate_path(Path::new("cache/backup.json")).unwrap(),
            PathBuf::from("cache/backup.json")
        );
    }

    #[test]
    fn test_clean_path_resolves_inner_segments() {
        assert_eq!(
            validate_path(Path::new("cache/./old/../backup.json")).unwrap(),
            PathBuf::from("cache/backup.json")
        );
        // climbing out of the root lands back on /etc
        assert!(validate_path(Path::new("/tmp/../../etc/shadow")).is_err());
        assert!(validate_path(Path::new("a/../../b")).is_err());
    }

    #[test]
    fn test_initialize_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("cache");
        let store = DurableStore::new(&dir, CacheConfig::default());

        store.initialize().unwrap();
        store.initialize().unwrap();

        assert!(dir.is_dir());
        assert!(!dir.join(PROBE_FILE_NAME).exists());
        assert!(store.validate_storage().is_ok());
    }

    #[test]
    fn test_validate_storage_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("absent"), CacheConfig::default());
        assert!(matches!(store.validate_storage(), Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());

        let snapshot = store.load().unwrap();
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.metrics, CacheMetrics::default());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());
        store.initialize().unwrap();

        let entries = sample_entries();
        let metrics = CacheMetrics {
            hits: 4,
            sets: 2,
            current_entries: 2,
            ..Default::default()
        };
        store.save(&entries, &metrics).unwrap();
        assert!(store.last_saved().is_some());
        assert!(!tmp.path().join("cache.json.tmp").exists());

        let mut reopened = DurableStore::new(tmp.path(), CacheConfig::default());
        let snapshot = reopened.load().unwrap();
        assert_eq!(snapshot.entries, entries);
        assert_eq!(snapshot.metrics, metrics);
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let tmp = TempDir::new().unwrap();
        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());
        store.initialize().unwrap();
        // a directory in place of the cache file makes the rename fail
        fs::create_dir(tmp.path().join("cache.json")).unwrap();

        assert!(store.save(&sample_entries(), &CacheMetrics::default()).is_err());
        assert!(!tmp.path().join("cache.json.tmp").exists());
        assert!(store.last_saved().is_none());
    }

    #[test]
    fn test_load_drops_expired_entries() {
        let tmp = TempDir::new().unwrap();
        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());

        let mut entries = sample_entries();
        entries.get_mut("tool:go").unwrap().expires_at =
            Some(Utc::now() - ChronoDuration::seconds(1));
        store.save(&entries, &CacheMetrics::default()).unwrap();

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert!(snapshot.entries.contains_key("tool:node"));
    }

    #[test]
    fn test_load_defaults_missing_metrics() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now().to_rfc3339();
        fs::write(
            tmp.path().join(CACHE_FILE_NAME),
            format!(
                r#"{{"version": "1.0", "created_at": "{now}", "updated_at": "{now}", "entries": {{}}}}"#
            ),
        )
        .unwrap();

        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.metrics, CacheMetrics::default());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CACHE_FILE_NAME), "{ not json").unwrap();

        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());
        assert!(matches!(store.load(), Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_save_disabled_is_noop() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig::default().with_persist_to_disk(false);
        let mut store = DurableStore::new(tmp.path(), config);

        store.save(&sample_entries(), &CacheMetrics::default()).unwrap();
        assert!(!store.file_path().exists());
        assert!(store.last_saved().is_none());
    }

    #[test]
    fn test_clear_tolerates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let mut store = DurableStore::new(tmp.path(), CacheConfig::default());

        store.clear().unwrap();
        store.save(&sample_entries(), &CacheMetrics::default()).unwrap();
        store.clear().unwrap();
        assert!(!store.file_path().exists());
    }

    #[test]
    fn test_backup_and_restore() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path().join("cache"), CacheConfig::default());
        let target = tmp.path().join("backups").join("2024").join("cache.json");

        let entries = sample_entries();
        let written = store.backup(&target, &entries, &CacheMetrics::default()).unwrap();
        assert_eq!(written, target);

        let raw = fs::read_to_string(&target).unwrap();
        assert!(raw.contains("\"version\": \"1.0\""), "backup should be pretty-printed");

        let snapshot = store.restore(&target).unwrap();
        assert_eq!(snapshot.entries, entries);
    }

    #[test]
    fn test_backup_rejects_traversal_without_writing() {
        let tmp = TempDir::new().unwrap();
        let store = DurableStore::new(tmp.path(), CacheConfig::default());

        let result = store.backup("../escape.json", &sample_entries(), &CacheMetrics::default());
        assert!(matches!(result, Err(CacheError::PathTraversal(_))));
        assert!(store.restore("/etc/cache.json").is_err());
    }
}
