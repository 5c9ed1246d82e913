//! Cache manager.

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::types::{Method, ResponseEnvelope};
use crate::Error;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default time-to-live of stored envelopes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
/// Entries larger than this are not stored.
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 10 * 1024 * 1024;

/// Methods whose responses may be cached and deduplicated by default.
pub fn default_cacheable_methods() -> BTreeSet<Method> {
    [Method::Get, Method::Head].into_iter().collect()
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// `None` stores without expiry.
    pub ttl: Option<Duration>,
    /// Namespace prepended to every key; empty for none.
    pub key_prefix: String,
    pub max_entry_size: usize,
    pub cacheable_methods: BTreeSet<Method>,
    /// Partition entries by the client's user scope.
    pub user_isolated: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Some(DEFAULT_CACHE_TTL),
            key_prefix: String::new(),
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            cacheable_methods: default_cacheable_methods(),
            user_isolated: false,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_cacheable_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.cacheable_methods = methods.into_iter().collect();
        self
    }

    pub fn with_user_isolation(mut self, isolated: bool) -> Self {
        self.user_isolated = isolated;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperation {
    Get,
    Set,
    Delete,
    Clear,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::Set => "set",
            CacheOperation::Delete => "delete",
            CacheOperation::Clear => "clear",
        }
    }
}

/// Receives cache failures that were swallowed on the request path.
pub trait CacheObserver: Send + Sync {
    fn on_backend_error(&self, operation: CacheOperation, key: &str, error: &Error);
}

/// Decides whether an envelope may be stored, replacing the default
/// "successful and replayable" rule.
pub type StorePredicate = Arc<dyn Fn(&ResponseEnvelope) -> bool + Send + Sync>;

/// Façade over a [`CacheBackend`].
///
/// Backend failures never reach the caller: a failed read is a miss, a
/// failed write is dropped, and both are logged, counted and forwarded to
/// the observer. Concurrent fills of one key resolve as last write wins.
pub struct CacheManager {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    stats: AtomicStats,
    observer: Option<Arc<dyn CacheObserver>>,
    store_predicate: Option<StorePredicate>,
}

impl CacheManager {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
            observer: None,
            store_predicate: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_store_predicate(mut self, predicate: StorePredicate) -> Self {
        self.store_predicate = Some(predicate);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_cacheable_method(&self, method: Method) -> bool {
        self.config.cacheable_methods.contains(&method)
    }

    /// `prefix:[user_scope:]hash`; the prefix segment is omitted when empty.
    pub fn effective_key(&self, key: &CacheKey) -> String {
        let mut out = self.namespace();
        if self.config.user_isolated {
            if let Some(ref scope) = key.user_scope {
                out.push_str(scope);
                out.push(':');
            }
        }
        out.push_str(&key.hash);
        out
    }

    fn namespace(&self) -> String {
        if self.config.key_prefix.is_empty() {
            String::new()
        } else {
            format!("{}:", self.config.key_prefix)
        }
    }

    /// Whether `envelope`, produced by a `method` request, may be stored.
    pub fn should_store(&self, method: Method, envelope: &ResponseEnvelope) -> bool {
        if !self.config.enabled || !self.is_cacheable_method(method) {
            return false;
        }
        if !envelope.data.is_cacheable() {
            return false;
        }
        match self.store_predicate {
            Some(ref pred) => pred(envelope),
            None => envelope.result,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<ResponseEnvelope> {
        if !self.config.enabled {
            return None;
        }
        let k = self.effective_key(key);
        match self.backend.get(&k).await {
            Ok(Some(data)) => match serde_json::from_slice::<ResponseEnvelope>(&data) {
                Ok(env) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(cache_key = %k, "cache hit");
                    Some(env)
                }
                Err(e) => {
                    self.report(CacheOperation::Get, &k, &Error::from(e));
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = %k, "cache miss");
                None
            }
            Err(e) => {
                self.report(CacheOperation::Get, &k, &e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, key: &CacheKey, envelope: &ResponseEnvelope) {
        self.set_with_ttl(key, envelope, self.config.ttl).await
    }

    pub async fn set_with_ttl(&self, key: &CacheKey, envelope: &ResponseEnvelope, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        let k = self.effective_key(key);
        let data = match serde_json::to_vec(envelope) {
            Ok(d) => d,
            Err(e) => {
                self.report(CacheOperation::Set, &k, &Error::from(e));
                return;
            }
        };
        if data.len() > self.config.max_entry_size {
            debug!(cache_key = %k, size = data.len(), "entry exceeds max size, not cached");
            return;
        }
        match self.backend.set(&k, &data, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.report(CacheOperation::Set, &k, &e),
        }
    }

    pub async fn delete(&self, key: &CacheKey) -> bool {
        if !self.config.enabled {
            return false;
        }
        let k = self.effective_key(key);
        match self.backend.delete(&k).await {
            Ok(deleted) => {
                if deleted {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                }
                deleted
            }
            Err(e) => {
                self.report(CacheOperation::Delete, &k, &e);
                false
            }
        }
    }

    /// Remove entries under this manager's namespace, optionally narrowed by
    /// a further `prefix`. Returns the number of removed entries.
    pub async fn clear(&self, prefix: Option<&str>) -> usize {
        let mut scope = self.namespace();
        if let Some(p) = prefix {
            scope.push_str(p);
        }
        let arg = if scope.is_empty() { None } else { Some(scope.as_str()) };
        match self.backend.clear(arg).await {
            Ok(n) => {
                self.stats.deletes.fetch_add(n as u64, Ordering::Relaxed);
                n
            }
            Err(e) => {
                self.report(CacheOperation::Clear, &scope, &e);
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn report(&self, op: CacheOperation, key: &str, err: &Error) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            operation = op.as_str(),
            cache_key = %key,
            backend = self.backend.name(),
            error = %err,
            "cache backend failure, continuing without cache"
        );
        if let Some(ref obs) = self.observer {
            obs.on_backend_error(op, key, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCache;
    use crate::types::Payload;
    use crate::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::cache_backend("store unavailable"))
        }
        async fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> Result<()> {
            Err(Error::cache_backend("store unavailable"))
        }
        async fn delete(&self, _: &str) -> Result<bool> {
            Err(Error::cache_backend("store unavailable"))
        }
        async fn exists(&self, _: &str) -> Result<bool> {
            Err(Error::cache_backend("store unavailable"))
        }
        async fn clear(&self, _: Option<&str>) -> Result<usize> {
            Err(Error::cache_backend("store unavailable"))
        }
        async fn len(&self) -> Result<usize> {
            Err(Error::cache_backend("store unavailable"))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[derive(Default)]
    struct RecordingObserver(Mutex<Vec<CacheOperation>>);

    impl CacheObserver for RecordingObserver {
        fn on_backend_error(&self, operation: CacheOperation, _: &str, _: &Error) {
            self.0.lock().unwrap().push(operation);
        }
    }

    fn ok_envelope() -> ResponseEnvelope {
        ResponseEnvelope::success(200, Payload::Json(json!({"id": 1})))
    }

    #[tokio::test]
    async fn test_roundtrip_and_stats() {
        let mgr = CacheManager::new(CacheConfig::default(), Arc::new(MemoryCache::new(8)));
        let key = CacheKey::new("abc");
        assert!(mgr.get(&key).await.is_none());
        mgr.set(&key, &ok_envelope()).await;
        assert_eq!(mgr.get(&key).await, Some(ok_envelope()));

        let stats = mgr.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn test_effective_key_namespacing() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new(8));
        let key = CacheKey::new("h").with_user_scope("alice");

        let plain = CacheManager::new(CacheConfig::default(), backend.clone());
        assert_eq!(plain.effective_key(&key), "h");

        let isolated = CacheManager::new(
            CacheConfig::default()
                .with_key_prefix("PostsClient")
                .with_user_isolation(true),
            backend,
        );
        assert_eq!(isolated.effective_key(&key), "PostsClient:alice:h");
    }

    #[tokio::test]
    async fn test_backend_failures_degrade_to_pass_through() {
        let observer = Arc::new(RecordingObserver::default());
        let mgr = CacheManager::new(CacheConfig::default(), Arc::new(BrokenBackend))
            .with_observer(observer.clone());
        let key = CacheKey::new("k");

        assert!(mgr.get(&key).await.is_none());
        mgr.set(&key, &ok_envelope()).await;
        assert_eq!(mgr.clear(None).await, 0);

        assert_eq!(mgr.stats().errors, 3);
        assert_eq!(
            *observer.0.lock().unwrap(),
            vec![CacheOperation::Get, CacheOperation::Set, CacheOperation::Clear]
        );
    }

    #[test]
    fn test_store_policy() {
        let mgr = CacheManager::new(CacheConfig::default(), Arc::new(MemoryCache::new(8)));
        assert!(mgr.should_store(Method::Get, &ok_envelope()));
        assert!(!mgr.should_store(Method::Post, &ok_envelope()));

        let failed = ResponseEnvelope::from_error(&Error::http(404, None));
        assert!(!mgr.should_store(Method::Get, &failed));

        let lenient = CacheManager::new(CacheConfig::default(), Arc::new(MemoryCache::new(8)))
            .with_store_predicate(Arc::new(|env: &ResponseEnvelope| env.code == 404));
        assert!(lenient.should_store(Method::Get, &failed));
        assert!(!lenient.should_store(Method::Get, &ok_envelope()));
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_namespace() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new(8));
        let posts = CacheManager::new(CacheConfig::default().with_key_prefix("posts"), backend.clone());
        let users = CacheManager::new(CacheConfig::default().with_key_prefix("users"), backend.clone());
        posts.set(&CacheKey::new("1"), &ok_envelope()).await;
        users.set(&CacheKey::new("1"), &ok_envelope()).await;

        assert_eq!(posts.clear(None).await, 1);
        assert!(users.get(&CacheKey::new("1")).await.is_some());
    }
}
