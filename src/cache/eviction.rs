//! Eviction Ordering Module
//!
//! Orders entries so that the first one is the next eviction victim under a
//! given policy.

use std::cmp::Ordering;

use crate::cache::CacheEntry;
use crate::config::EvictionPolicy;

// == Policy Comparator ==
/// Compares two entries for eviction; `Less` means `a` goes first.
///
/// Ties fall back to the key so the order is deterministic.
pub fn eviction_order(policy: EvictionPolicy, a: &CacheEntry, b: &CacheEntry) -> Ordering {
    let primary = match policy {
        EvictionPolicy::Lru => a.accessed_at.cmp(&b.accessed_at),
        EvictionPolicy::Lfu => a.access_count.cmp(&b.access_count),
        EvictionPolicy::Fifo => a.created_at.cmp(&b.created_at),
        EvictionPolicy::Ttl => match (a.expires_at, b.expires_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            // no expiry sorts last
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.created_at.cmp(&b.created_at)),
    };
    primary.then_with(|| a.key.cmp(&b.key))
}

/// Returns the keys of `entries` in eviction order.
pub fn victims<'a, I>(policy: EvictionPolicy, entries: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a CacheEntry>,
{
    let mut candidates: Vec<&CacheEntry> = entries.into_iter().collect();
    candidates.sort_by(|a, b| eviction_order(policy, a, b));
    candidates.into_iter().map(|e| e.key.clone()).collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheValue;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn entry(key: &str, age_secs: i64) -> CacheEntry {
        let mut e = CacheEntry::new(key, CacheValue::from("v"), Duration::ZERO, Duration::ZERO);
        let at = Utc::now() - ChronoDuration::seconds(age_secs);
        e.created_at = at;
        e.updated_at = at;
        e.accessed_at = at;
        e
    }

    #[test]
    fn test_lru_oldest_access_first() {
        let a = entry("a", 30);
        let b = entry("b", 20);
        let c = entry("c", 10);

        let order = victims(EvictionPolicy::Lru, [&c, &a, &b]);
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_lfu_lowest_count_first() {
        let mut a = entry("a", 0);
        let mut b = entry("b", 0);
        let c = entry("c", 0);
        a.access_count = 5;
        b.access_count = 2;

        let order = victims(EvictionPolicy::Lfu, [&a, &b, &c]);
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let a = entry("a", 30);
        let mut b = entry("b", 20);
        b.accessed_at = Utc::now() - ChronoDuration::seconds(100);

        let order = victims(EvictionPolicy::Fifo, [&b, &a]);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_ttl_no_expiry_sorts_last() {
        let now = Utc::now();
        let mut soon = entry("soon", 0);
        soon.expires_at = Some(now + ChronoDuration::seconds(5));
        let mut later = entry("later", 0);
        later.expires_at = Some(now + ChronoDuration::seconds(500));
        let forever_old = entry("forever_old", 50);
        let forever_new = entry("forever_new", 5);

        let order = victims(
            EvictionPolicy::Ttl,
            [&forever_new, &later, &forever_old, &soon],
        );
        assert_eq!(order, vec!["soon", "later", "forever_old", "forever_new"]);
    }
}
