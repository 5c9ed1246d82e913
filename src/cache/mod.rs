//! 响应缓存模块：可插拔后端、确定性缓存键与降级策略。
//!
//! # Response Caching Module
//!
//! Caches formatted response envelopes of idempotent requests and derives the
//! keys that batch deduplication groups on.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Façade with namespacing, storage policy and statistics |
//! | [`CacheConfig`] | TTL, prefix, cacheable methods and user isolation |
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | In-memory LRU cache with per-entry TTL |
//! | [`NullCache`] | No-op cache for disabling caching |
//! | [`CacheKeyBuilder`] | Deterministic key derivation |
//!
//! ## Example
//!
//! ```rust
//! use httpflex::cache::{CacheConfig, CacheManager, MemoryCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = CacheManager::new(
//!     CacheConfig::new()
//!         .with_ttl(Some(Duration::from_secs(60)))
//!         .with_key_prefix("PostsClient"),
//!     Arc::new(MemoryCache::new(1000)),
//! );
//! assert_eq!(cache.backend_name(), "memory");
//! ```
//!
//! ## Cache Key Generation
//!
//! Keys hash the client identity, method, resolved URL, the params left over
//! after endpoint templating (key order never matters), a small set of
//! representation headers and, under user isolation, the user scope.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache, DEFAULT_MEMORY_CAPACITY};
pub use key::{canonical_json, CacheKey, CacheKeyBuilder, DEFAULT_RELEVANT_HEADERS};
pub use manager::{
    default_cacheable_methods, CacheConfig, CacheManager, CacheObserver, CacheOperation,
    CacheStats, StorePredicate, DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRY_SIZE,
};
