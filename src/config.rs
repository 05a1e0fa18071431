//! Configuration Module
//!
//! Cache limits, eviction policy and compression settings, loadable from
//! environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Eviction Policy ==
/// Rule used to order entries for eviction.
///
/// Unrecognised names fall back to [`EvictionPolicy::Lru`], both when parsed
/// from the environment and when read back from a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EvictionPolicy {
    /// Least recently accessed first
    #[default]
    Lru,
    /// Lowest access count first
    Lfu,
    /// Oldest creation time first
    Fifo,
    /// Soonest expiry first, entries without expiry last
    Ttl,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Ttl => "ttl",
        }
    }
}

impl From<&str> for EvictionPolicy {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "lfu" => EvictionPolicy::Lfu,
            "fifo" => EvictionPolicy::Fifo,
            "ttl" => EvictionPolicy::Ttl,
            _ => EvictionPolicy::Lru,
        }
    }
}

impl From<String> for EvictionPolicy {
    fn from(name: String) -> Self {
        EvictionPolicy::from(name.as_str())
    }
}

impl From<EvictionPolicy> for String {
    fn from(policy: EvictionPolicy) -> Self {
        policy.as_str().to_string()
    }
}

impl FromStr for EvictionPolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(EvictionPolicy::from(s))
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Compression Type ==
/// Compression codec applied to large values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    Gzip,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::Gzip => "gzip",
        }
    }
}

// == Cache Config ==
/// Cache engine configuration.
///
/// Immutable for the lifetime of a manager unless explicitly swapped through
/// `CacheManager::set_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum total entry size in bytes, 0 = unlimited
    pub max_size: u64,
    /// Maximum number of entries, 0 = unlimited
    pub max_entries: usize,
    /// Ordering used to choose eviction victims
    pub eviction_policy: EvictionPolicy,
    /// Fraction of capacity reclaimed per eviction pass
    pub eviction_ratio: f64,
    /// TTL applied when a write does not specify one, zero = no expiry
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
    /// Compress values larger than the compression threshold
    pub enable_compression: bool,
    pub compression_type: CompressionType,
    /// gzip level, 0..=9
    pub compression_level: u32,
    /// Write the cache file after every mutation
    pub persist_to_disk: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100 * 1024 * 1024, // 100 MiB
            max_entries: 10_000,
            eviction_policy: EvictionPolicy::Lru,
            eviction_ratio: 0.1,
            default_ttl: Duration::from_secs(24 * 60 * 60),
            enable_compression: false,
            compression_type: CompressionType::Gzip,
            compression_level: 6,
            persist_to_disk: true,
        }
    }
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Maximum total size in bytes (default: 100 MiB)
    /// - `CACHE_MAX_ENTRIES` - Maximum entry count (default: 10000)
    /// - `CACHE_EVICTION_POLICY` - lru, lfu, fifo or ttl (default: lru)
    /// - `CACHE_EVICTION_RATIO` - Fraction reclaimed per pass (default: 0.1)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 86400)
    /// - `CACHE_ENABLE_COMPRESSION` - true/false (default: false)
    /// - `CACHE_COMPRESSION_LEVEL` - gzip level (default: 6)
    /// - `CACHE_PERSIST` - true/false (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_parse("CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            eviction_policy: env::var("CACHE_EVICTION_POLICY")
                .map(EvictionPolicy::from)
                .unwrap_or(defaults.eviction_policy),
            eviction_ratio: env_parse("CACHE_EVICTION_RATIO").unwrap_or(defaults.eviction_ratio),
            default_ttl: env_parse("CACHE_DEFAULT_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            enable_compression: env_parse("CACHE_ENABLE_COMPRESSION")
                .unwrap_or(defaults.enable_compression),
            compression_type: defaults.compression_type,
            compression_level: env_parse("CACHE_COMPRESSION_LEVEL")
                .unwrap_or(defaults.compression_level),
            persist_to_disk: env_parse("CACHE_PERSIST").unwrap_or(defaults.persist_to_disk),
        }
    }

    /// Rejects settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(self.eviction_ratio > 0.0 && self.eviction_ratio < 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "eviction ratio must be in (0, 1), got {}",
                self.eviction_ratio
            )));
        }
        if self.compression_level > 9 {
            return Err(CacheError::InvalidConfig(format!(
                "compression level must be in 0..=9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_eviction_ratio(mut self, ratio: f64) -> Self {
        self.eviction_ratio = ratio;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_persist_to_disk(mut self, persist: bool) -> Self {
        self.persist_to_disk = persist;
        self
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Serializes a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, 100 * 1024 * 1024);
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(config.eviction_ratio, 0.1);
        assert_eq!(config.default_ttl, Duration::from_secs(86_400));
        assert!(!config.enable_compression);
        assert!(config.persist_to_disk);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_MAX_SIZE",
            "CACHE_MAX_ENTRIES",
            "CACHE_EVICTION_POLICY",
            "CACHE_EVICTION_RATIO",
            "CACHE_DEFAULT_TTL",
            "CACHE_ENABLE_COMPRESSION",
            "CACHE_COMPRESSION_LEVEL",
            "CACHE_PERSIST",
        ] {
            env::remove_var(name);
        }

        assert_eq!(CacheConfig::from_env(), CacheConfig::default());
    }

    #[test]
    fn test_unknown_policy_falls_back_to_lru() {
        assert_eq!(EvictionPolicy::from("lfu"), EvictionPolicy::Lfu);
        assert_eq!(EvictionPolicy::from("FIFO"), EvictionPolicy::Fifo);
        assert_eq!(EvictionPolicy::from("random"), EvictionPolicy::Lru);

        let policy: EvictionPolicy = serde_json::from_str("\"mru\"").unwrap();
        assert_eq!(policy, EvictionPolicy::Lru);
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        for ratio in [0.0, 1.0, -0.5, 1.5] {
            let config = CacheConfig::default().with_eviction_ratio(ratio);
            assert!(matches!(
                config.validate(),
                Err(CacheError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let config = CacheConfig::default().with_compression_level(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_ttl_saturates_on_serialize() {
        let config = CacheConfig::default().with_default_ttl(Duration::MAX);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["default_ttl"], u64::MAX);
    }

    #[test]
    fn test_config_serde_shape() {
        let config = CacheConfig::default().with_default_ttl(Duration::from_secs(2));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["default_ttl"], 2000);
        assert_eq!(json["eviction_policy"], "lru");
        assert_eq!(json["compression_type"], "gzip");

        let back: CacheConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
