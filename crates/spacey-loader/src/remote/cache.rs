// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! LRU + TTL cache of fetched remote module bytes

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// A cached response body
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Exact request URL
    pub url: String,
    /// Response body
    pub bytes: Bytes,
    /// Response content type
    pub content_type: Option<String>,
    /// When the body was fetched
    pub fetched_at: Instant,
    /// Lifetime from `fetched_at`
    pub ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry has outlived its TTL
    pub fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that missed or found an expired entry
    pub misses: u64,
    /// Entries currently held
    pub entries: usize,
    /// Maximum number of entries
    pub capacity: usize,
    /// Sum of cached body sizes
    pub total_bytes: usize,
}

/// Remote byte cache keyed by exact URL.
///
/// Expiry is checked lazily on lookup. An expired entry stays in place until
/// a successful refetch overwrites it or LRU eviction drops it.
pub struct RemoteCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl RemoteCache {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(non_zero(capacity)),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Fresh entry for `url`, marking it most recently used
    pub fn get(&mut self, url: &str) -> Option<CacheEntry> {
        match self.entries.get(url) {
            Some(entry) if !entry.is_expired() => {
                self.hits += 1;
                Some(entry.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or refresh the entry for `url`, evicting the LRU entry if full.
    pub fn put(&mut self, url: &str, bytes: Bytes, content_type: Option<String>) -> CacheEntry {
        let entry = CacheEntry {
            url: url.to_string(),
            bytes,
            content_type,
            fetched_at: Instant::now(),
            ttl: self.ttl,
        };
        if let Some((evicted, _)) = self.entries.push(url.to_string(), entry.clone()) {
            if evicted != url {
                tracing::debug!("Evicted remote module {}", evicted);
            }
        }
        entry
    }

    /// Whether an entry (fresh or not) exists for `url`; does not touch LRU order
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    /// Change capacity, evicting LRU entries if shrinking
    pub fn resize(&mut self, capacity: usize) {
        self.entries.resize(non_zero(capacity));
    }

    /// Change the TTL applied to future insertions
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Drop every entry and reset counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            capacity: self.entries.cap().get(),
            total_bytes: self.entries.iter().map(|(_, e)| e.bytes.len()).sum(),
        }
    }
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction() {
        let mut cache = RemoteCache::new(2, Duration::from_secs(60));
        cache.put("a", Bytes::from_static(b"1"), None);
        cache.put("b", Bytes::from_static(b"22"), None);
        assert!(cache.get("a").is_some());
        cache.put("c", Bytes::from_static(b"333"), None);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.total_bytes, 4);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_but_kept() {
        let mut cache = RemoteCache::new(4, Duration::from_secs(10));
        cache.put("a", Bytes::from_static(b"x"), Some("text/javascript".into()));
        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(cache.get("a").is_none());
        assert!(cache.contains("a"));
        assert_eq!(cache.stats().misses, 1);

        cache.put("a", Bytes::from_static(b"y"), None);
        assert_eq!(cache.get("a").unwrap().bytes, Bytes::from_static(b"y"));
    }
}
