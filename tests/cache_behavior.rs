//! Cache modes, storage policy and backend degradation.

mod common;

use async_trait::async_trait;
use common::{builder, client, ScriptedTransport};
use httpflex::cache::{CacheBackend, CacheObserver, CacheOperation, MemoryCache};
use httpflex::{CacheMode, Error, Method, RequestSpec, ResponseEnvelope, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn post(id: i64) -> RequestSpec {
    RequestSpec::new().param("post_id", id)
}

#[tokio::test]
async fn test_repeat_get_is_served_from_cache() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = client(transport.clone());

    let first = client.request(post(1)).await.unwrap();
    let second = client.request(post(1)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);

    let stats = client.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.sets, 1);
}

#[tokio::test]
async fn test_post_is_never_cached() {
    let transport = Arc::new(ScriptedTransport::echo());
    let client = client(transport.clone());

    let create = RequestSpec::new()
        .endpoint("/posts")
        .method(Method::Post)
        .param("title", "x");
    client.request(create.clone()).await.unwrap();
    client.request(create).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache_stats().sets, 0);
}

#[tokio::test]
async fn test_bypass_neither_reads_nor_writes() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = client(transport.clone());

    let bypass = client.cacheless();
    bypass.request(post(1)).await.unwrap();
    bypass.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);

    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_refresh_overwrites_entry() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = client(transport.clone());

    client.request(post(1)).await.unwrap();
    client.refresh().request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);

    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache_stats().sets, 2);
}

#[tokio::test]
async fn test_request_with_explicit_mode() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = client(transport.clone());

    client.request(post(1)).await.unwrap();
    client.request_with(post(1), CacheMode::Bypass).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let transport = Arc::new(ScriptedTransport::status(404));
    let client = client(transport.clone());

    client.request(post(1)).await.unwrap();
    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_disabled_cache_always_dispatches() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = builder(transport.clone()).cache_enabled(false).build().unwrap();

    client.request(post(1)).await.unwrap();
    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = builder(transport.clone())
        .cache_ttl(Some(Duration::from_millis(30)))
        .build()
        .unwrap();

    client.request(post(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_user_scopes_do_not_share_entries() {
    let transport = Arc::new(ScriptedTransport::posts());
    let backend = Arc::new(MemoryCache::new(16));
    let for_user = |scope: &str| {
        builder(transport.clone())
            .cache_backend(backend.clone())
            .user_isolated_cache(true)
            .user_scope(scope)
            .build()
            .unwrap()
    };
    let alice = for_user("alice");
    let bob = for_user("bob");

    alice.request(post(1)).await.unwrap();
    bob.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(backend.len().await.unwrap(), 2);

    alice.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_isolation_requires_a_scope() {
    let err = builder(Arc::new(ScriptedTransport::posts()))
        .user_isolated_cache(true)
        .build()
        .err()
        .unwrap();
    assert_eq!(err.kind(), httpflex::ErrorKind::Configuration);
}

#[tokio::test]
async fn test_clients_with_different_identities_do_not_collide() {
    let transport = Arc::new(ScriptedTransport::posts());
    let backend = Arc::new(MemoryCache::new(16));
    let posts = builder(transport.clone())
        .cache_backend(backend.clone())
        .build()
        .unwrap();
    let mirror = builder(transport.clone())
        .identity("MirrorClient")
        .cache_backend(backend.clone())
        .build()
        .unwrap();

    posts.request(post(1)).await.unwrap();
    mirror.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_clear_cache_removes_only_own_entries() {
    let transport = Arc::new(ScriptedTransport::posts());
    let backend = Arc::new(MemoryCache::new(16));
    let posts = builder(transport.clone())
        .cache_backend(backend.clone())
        .build()
        .unwrap();
    let mirror = builder(transport.clone())
        .identity("MirrorClient")
        .cache_backend(backend.clone())
        .build()
        .unwrap();

    posts.request(post(1)).await.unwrap();
    posts.request(post(2)).await.unwrap();
    mirror.request(post(1)).await.unwrap();

    assert_eq!(posts.clear_cache(None).await, 2);
    assert_eq!(backend.len().await.unwrap(), 1);

    posts.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 4);
}

struct BrokenBackend;

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(Error::cache_backend("connection reset"))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<()> {
        Err(Error::cache_backend("connection reset"))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(Error::cache_backend("connection reset"))
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Err(Error::cache_backend("connection reset"))
    }

    async fn clear(&self, _prefix: Option<&str>) -> Result<usize> {
        Err(Error::cache_backend("connection reset"))
    }

    async fn len(&self) -> Result<usize> {
        Err(Error::cache_backend("connection reset"))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<CacheOperation>>,
}

impl CacheObserver for RecordingObserver {
    fn on_backend_error(&self, operation: CacheOperation, _key: &str, _error: &Error) {
        self.seen.lock().unwrap().push(operation);
    }
}

#[tokio::test]
async fn test_backend_failures_degrade_to_uncached_dispatch() {
    let transport = Arc::new(ScriptedTransport::posts());
    let observer = Arc::new(RecordingObserver::default());
    let client = builder(transport.clone())
        .cache_backend(Arc::new(BrokenBackend))
        .cache_observer(observer.clone())
        .build()
        .unwrap();

    let env = client.request(post(1)).await.unwrap();
    assert!(env.result);
    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 2);

    let seen = observer.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            CacheOperation::Get,
            CacheOperation::Set,
            CacheOperation::Get,
            CacheOperation::Set
        ]
    );
    assert_eq!(client.cache_stats().errors, 4);
    assert_eq!(client.clear_cache(None).await, 0);
}

#[tokio::test]
async fn test_store_predicate_overrides_default_rule() {
    let transport = Arc::new(ScriptedTransport::posts());
    let client = builder(transport.clone())
        .store_predicate(Arc::new(|env: &ResponseEnvelope| {
            env.data.as_json().is_some_and(|d| d["id"] == 1)
        }))
        .build()
        .unwrap();

    client.request(post(1)).await.unwrap();
    client.request(post(1)).await.unwrap();
    assert_eq!(transport.calls(), 1);

    client.request(post(2)).await.unwrap();
    client.request(post(2)).await.unwrap();
    assert_eq!(transport.calls(), 3);
}
