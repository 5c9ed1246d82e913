//! Cache backend implementations.

use crate::{Error, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default capacity of [`MemoryCache`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 128;

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// Key/value store with optional TTL.
///
/// Implementations must be safe for concurrent use; the manager holds no
/// locks of its own around backend calls.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// `ttl = None` stores without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Remove entries whose key starts with `prefix` (all entries for `None`).
    /// Returns the number of removed entries.
    async fn clear(&self, prefix: Option<&str>) -> Result<usize>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-process LRU cache with per-entry TTL. Expired entries are dropped
/// lazily on access.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|e| Error::cache_backend(format!("memory cache lock poisoned: {}", e)))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.lock()?;
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.lock()?
            .put(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.pop(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .peek(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false))
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<usize> {
        let mut entries = self.lock()?;
        match prefix {
            None => {
                let n = entries.len();
                entries.clear();
                Ok(n)
            }
            Some(prefix) => {
                let doomed: Vec<String> = entries
                    .iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in &doomed {
                    entries.pop(k);
                }
                Ok(doomed.len())
            }
        }
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend that stores nothing.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn exists(&self, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self, _: Option<&str>) -> Result<usize> {
        Ok(0)
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
