//! Cache Module
//!
//! Entry store with TTL expiry and policy-driven eviction, single-file
//! persistence, and the manager façade the rest of the tool talks to.

mod compression;
mod entry;
mod eviction;
mod manager;
mod observer;
mod stats;
mod storage;
mod store;
mod value;


// Re-export public types
pub use entry::{
    expiry_after, CacheEntry, META_COMPRESSION_TYPE, META_ORIGINAL_SIZE, META_VALUE_KIND,
};
pub use eviction::{eviction_order, victims};
pub use manager::CacheManager;
pub use observer::{CacheObserver, EvictionReason, NoopObserver, TracingObserver};
pub use stats::{CacheMetrics, CacheStats};
pub use storage::{validate_path, CacheFile, DurableStore, Snapshot, CACHE_FILE_NAME, FORMAT_VERSION};
pub use store::EntryStore;
pub use value::CacheValue;

// == Public Constants ==
/// Values larger than this many bytes are candidates for compression
pub const COMPRESSION_THRESHOLD: u64 = 1024;
