//! In-process TTL cache
//!
//! Small keyed cache for values that are cheap to recompute but called often
//! (user records, upstream responses). Expired entries are dropped lazily on
//! read and in bulk by [`TtlCache::cleanup`], which the maintenance sweeper
//! calls periodically.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed cache with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store a value for `ttl`
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Duration, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Fetch a live value, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if now <= entry.expires_at {
                return Some(entry.value.clone());
            }
        }

        // Re-checked under the shard lock so a concurrent set survives
        self.entries.remove_if(key, |_, entry| now > entry.expires_at);
        None
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove every key containing `pattern`
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.contains(pattern);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let live = now <= entry.expires_at;
            if !live {
                evicted += 1;
            }
            live
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached value or compute, store and return it
    pub async fn get_or_insert_with<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}

/// Join key parts with `:`
pub fn cache_key<I, T>(parts: I) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    parts
        .into_iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(":")
}
