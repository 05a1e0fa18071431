//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, access
//! bookkeeping and optional compression.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::compression;
use crate::cache::CacheValue;
use crate::config::{duration_ms, CompressionType};
use crate::error::{CacheError, Result};

// == Metadata Keys ==
pub const META_ORIGINAL_SIZE: &str = "original_size";
pub const META_COMPRESSION_TYPE: &str = "compression_type";
pub const META_VALUE_KIND: &str = "value_kind";

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// The stored value, the gzip bytes when `compressed` is set
    pub value: CacheValue,
    /// Estimated size in bytes of the stored form
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    /// Expiration time, None = no expiration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Duration used to recompute `expires_at` on refresh
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
    pub access_count: u64,
    pub compressed: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// A zero `ttl` falls back to `default_ttl`; if that is also zero the
    /// entry never expires.
    pub fn new(
        key: impl Into<String>,
        value: CacheValue,
        ttl: Duration,
        default_ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = if ttl.is_zero() { default_ttl } else { ttl };
        let size = value.estimated_size();

        Self {
            key: key.into(),
            value,
            size,
            created_at: now,
            updated_at: now,
            accessed_at: now,
            expires_at: expiry_after(now, ttl),
            ttl,
            access_count: 0,
            compressed: false,
            metadata: BTreeMap::new(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Remaining lifetime; zero when there is no expiry or it already passed.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at
            .and_then(|expires| (expires - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Records a successful read.
    pub fn touch(&mut self) {
        self.accessed_at = Utc::now();
        self.access_count += 1;
    }

    /// Replaces the TTL and recomputes the expiry from now.
    pub fn set_ttl(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.ttl = ttl;
        self.expires_at = expiry_after(now, ttl);
        self.updated_at = now;
    }

    /// Restarts the current TTL from now.
    pub fn refresh(&mut self) {
        self.set_ttl(self.ttl);
    }

    // == Compression ==
    /// Attempts to replace the value with its compressed form.
    ///
    /// Returns `Ok(true)` only if the compressed bytes are strictly smaller
    /// than the encoded value; otherwise the entry is left untouched.
    pub fn try_compress(&mut self, kind: CompressionType, level: u32) -> Result<bool> {
        if self.compressed {
            return Ok(false);
        }

        let raw = self.value.to_bytes()?;
        let packed = compression::compress(kind, &raw, level)?;
        if packed.len() >= raw.len() {
            return Ok(false);
        }

        let value_kind = self.value.kind();
        self.metadata
            .insert(META_ORIGINAL_SIZE.to_string(), raw.len().to_string());
        self.metadata
            .insert(META_COMPRESSION_TYPE.to_string(), kind.as_str().to_string());
        self.metadata
            .insert(META_VALUE_KIND.to_string(), value_kind.to_string());
        self.size = packed.len() as u64;
        self.value = CacheValue::Bytes(packed);
        self.compressed = true;
        Ok(true)
    }

    /// Returns the value as originally stored, decompressing if needed.
    pub fn decoded_value(&self) -> Result<CacheValue> {
        if !self.compressed {
            return Ok(self.value.clone());
        }

        let packed = match &self.value {
            CacheValue::Bytes(b) => b,
            _ => {
                return Err(CacheError::Compression(format!(
                    "compressed entry {} does not hold bytes",
                    self.key
                )))
            }
        };
        let kind = match self.metadata.get(META_COMPRESSION_TYPE).map(String::as_str) {
            Some("gzip") | None => CompressionType::Gzip,
            Some(other) => {
                return Err(CacheError::Compression(format!(
                    "unsupported compression type: {}",
                    other
                )))
            }
        };
        let raw = compression::decompress(kind, packed)?;
        let value_kind = self
            .metadata
            .get(META_VALUE_KIND)
            .map(String::as_str)
            .unwrap_or("bytes");
        CacheValue::from_bytes(value_kind, raw)
    }

    /// Recorded pre-compression size, if the entry is compressed.
    pub fn original_size(&self) -> Option<u64> {
        self.metadata
            .get(META_ORIGINAL_SIZE)
            .and_then(|s| s.parse().ok())
    }
}

// == Utility Functions ==
/// Expiry instant for a TTL starting at `now`; None for zero or overflowing TTLs.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    if ttl.is_zero() {
        return None;
    }
    let expiry = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta));
    if expiry.is_none() {
        warn!(ttl_secs = ttl.as_secs(), "ttl out of range, entry will not expire");
    }
    expiry
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("k", CacheValue::from("hello"), Duration::ZERO, Duration::ZERO);

        assert_eq!(entry.key, "k");
        assert_eq!(entry.size, 5);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert_eq!(entry.access_count, 0);
        assert!(entry.created_at <= entry.updated_at);
    }

    #[test]
    fn test_overflowing_ttl_never_expires() {
        assert!(expiry_after(Utc::now(), Duration::MAX).is_none());
        let entry = CacheEntry::new("k", CacheValue::from("v"), Duration::MAX, Duration::ZERO);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_uses_default_ttl() {
        let entry = CacheEntry::new(
            "k",
            CacheValue::from("v"),
            Duration::ZERO,
            Duration::from_secs(60),
        );

        assert_eq!(entry.ttl, Duration::from_secs(60));
        assert!(entry.expires_at.is_some());
    }

    #[test]
    fn test_explicit_ttl_wins() {
        let entry = CacheEntry::new(
            "k",
            CacheValue::from("v"),
            Duration::from_secs(10),
            Duration::from_secs(60),
        );

        let remaining = entry.ttl_remaining();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let mut entry = CacheEntry::new("k", CacheValue::from("v"), Duration::ZERO, Duration::ZERO);
        let now = Utc::now();
        entry.expires_at = Some(now);

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_touch_updates_access() {
        let mut entry = CacheEntry::new("k", CacheValue::from("v"), Duration::ZERO, Duration::ZERO);
        let before = entry.accessed_at;

        entry.touch();
        entry.touch();

        assert_eq!(entry.access_count, 2);
        assert!(entry.accessed_at >= before);
    }

    #[test]
    fn test_set_ttl_zero_clears_expiry() {
        let mut entry = CacheEntry::new(
            "k",
            CacheValue::from("v"),
            Duration::from_secs(5),
            Duration::ZERO,
        );
        entry.set_ttl(Duration::ZERO);
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_compress_commits_when_smaller() {
        let text = "eslint ".repeat(400);
        let mut entry = CacheEntry::new("k", CacheValue::from(text.clone()), Duration::ZERO, Duration::ZERO);

        assert!(entry.try_compress(CompressionType::Gzip, 6).unwrap());
        assert!(entry.compressed);
        assert!(entry.size < entry.original_size().unwrap());
        assert_eq!(entry.original_size(), Some(text.len() as u64));
        assert_eq!(entry.metadata[META_COMPRESSION_TYPE], "gzip");
        assert_eq!(entry.decoded_value().unwrap(), CacheValue::from(text));
    }

    #[test]
    fn test_compress_skipped_when_not_smaller() {
        // gzip framing makes a tiny payload grow
        let mut entry = CacheEntry::new("k", CacheValue::from("ab"), Duration::ZERO, Duration::ZERO);

        assert!(!entry.try_compress(CompressionType::Gzip, 6).unwrap());
        assert!(!entry.compressed);
        assert_eq!(entry.size, 2);
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn test_entry_serde_omits_missing_expiry() {
        let entry = CacheEntry::new("k", CacheValue::from("v"), Duration::ZERO, Duration::ZERO);
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("expires_at").is_none());
        assert_eq!(json["ttl"], 0);

        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
