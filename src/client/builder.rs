use crate::batch::{AsyncExecutor, BatchCoordinator, TaskPoolExecutor};
use crate::cache::{
    CacheBackend, CacheConfig, CacheKeyBuilder, CacheManager, CacheObserver, MemoryCache, NullCache,
    StorePredicate,
};
use crate::client::config::ClientConfig;
use crate::client::core::Client;
use crate::client::dispatch::Dispatcher;
use crate::hooks::{HookPipeline, HookRegistration};
use crate::request::RequestValidator;
use crate::response::{
    DefaultFormatter, JsonParser, ResponseFormatter, ResponseParser, ResponseValidator, ValidatorChain,
};
use crate::retry::RetryPolicy;
use crate::transport::{Authenticator, HttpTransport, Transport};
use crate::types::Method;
use crate::{Error, Result};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for [`Client`].
///
/// Everything has a default except the base URL. Components left unset get
/// the stock implementation: `reqwest` transport, in-memory LRU cache, JSON
/// parser, identity formatter and a tokio task pool for batches.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    cache_observer: Option<Arc<dyn CacheObserver>>,
    store_predicate: Option<StorePredicate>,
    parser: Option<Arc<dyn ResponseParser>>,
    request_validator: Option<Arc<dyn RequestValidator>>,
    response_validators: ValidatorChain,
    formatter: Option<Arc<dyn ResponseFormatter>>,
    executor: Option<Arc<dyn AsyncExecutor>>,
    hooks: Vec<HookRegistration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            authenticator: None,
            cache_backend: None,
            cache_observer: None,
            store_predicate: None,
            parser: None,
            request_validator: None,
            response_validators: ValidatorChain::new(),
            formatter: None,
            executor: None,
            hooks: Vec::new(),
        }
    }

    /// Start from defaults overlaid with `HTTPFLEX_*` environment knobs:
    /// - `HTTPFLEX_TIMEOUT_SECS`
    /// - `HTTPFLEX_MAX_WORKERS`
    /// - `HTTPFLEX_MAX_RETRIES`
    /// - `HTTPFLEX_CACHE_TTL_SECS`
    /// - `HTTPFLEX_PROXY_URL`
    /// - `HTTPFLEX_POOL_MAX_IDLE_PER_HOST`
    /// - `HTTPFLEX_VERIFY_TLS`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        let cfg = &mut builder.config;
        if let Some(secs) = env_parse::<u64>("HTTPFLEX_TIMEOUT_SECS") {
            cfg.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = env_parse::<usize>("HTTPFLEX_MAX_WORKERS") {
            cfg.max_workers = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("HTTPFLEX_MAX_RETRIES") {
            cfg.retry.max_retries = n;
        }
        if let Some(secs) = env_parse::<u64>("HTTPFLEX_CACHE_TTL_SECS") {
            cfg.cache.ttl = Some(Duration::from_secs(secs));
        }
        if let Ok(proxy) = env::var("HTTPFLEX_PROXY_URL") {
            if !proxy.trim().is_empty() {
                cfg.transport.proxy_url = Some(proxy);
            }
        }
        if let Some(n) = env_parse::<usize>("HTTPFLEX_POOL_MAX_IDLE_PER_HOST") {
            cfg.transport.pool_max_idle_per_host = n;
        }
        if let Some(verify) = env_parse::<bool>("HTTPFLEX_VERIFY_TLS") {
            cfg.verify_tls = verify;
        }
        builder
    }

    /// Name of the client type; scopes cache keys and the default cache prefix.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.config.identity = identity.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Default endpoint template, e.g. `/posts/{post_id}`.
    pub fn endpoint(mut self, template: impl Into<String>) -> Self {
        self.config.endpoint = template.into();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.config.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    /// Entry capacity of the default in-memory cache.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn user_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.user_scope = Some(scope.into());
        self
    }

    /// Partition cached entries by user scope. Requires [`Self::user_scope`].
    pub fn user_isolated_cache(mut self, isolated: bool) -> Self {
        self.config.cache.user_isolated = isolated;
        self
    }

    pub fn sanitize_logs(mut self, enabled: bool) -> Self {
        self.config.sanitize_logs = enabled;
        self
    }

    /// Extra header names to mask in logs (case-insensitive).
    pub fn sensitive_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .sensitive_headers
            .extend(names.into_iter().map(|s| s.into().to_ascii_lowercase()));
        self
    }

    /// Extra parameter names to mask in logs (case-insensitive).
    pub fn sensitive_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .sensitive_params
            .extend(names.into_iter().map(|s| s.into().to_ascii_lowercase()));
        self
    }

    /// Return `Err` from single requests instead of a failed envelope.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.config.raise_on_error = raise;
        self
    }

    pub fn deduplicate(mut self, dedup: bool) -> Self {
        self.config.deduplicate = dedup;
        self
    }

    /// Bound the wait on a concurrent batch; unfinished groups time out.
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout = Some(timeout);
        self
    }

    pub fn cancel_on_timeout(mut self, cancel: bool) -> Self {
        self.config.cancel_on_timeout = cancel;
        self
    }

    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.config.transport.proxy_url = Some(url.into());
        self
    }

    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.config.transport.pool_max_idle_per_host = n;
        self
    }

    /// Verify server certificates (on by default). Turning this off accepts
    /// any certificate, including self-signed and expired ones.
    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify_tls = verify;
        self
    }

    /// Credentials applied to every outgoing request.
    pub fn authentication(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn cache_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.cache_observer = Some(observer);
        self
    }

    /// Override which successful envelopes get stored.
    pub fn store_predicate(mut self, predicate: StorePredicate) -> Self {
        self.store_predicate = Some(predicate);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn request_validator(mut self, validator: Arc<dyn RequestValidator>) -> Self {
        self.request_validator = Some(validator);
        self
    }

    /// Append a response validator; validators run in the order added.
    pub fn response_validator(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
        self.response_validators.push(validator);
        self
    }

    pub fn formatter(mut self, formatter: Arc<dyn ResponseFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Executor for concurrent batches (defaults to a task pool sized by
    /// [`Self::max_workers`]).
    pub fn executor(mut self, executor: Arc<dyn AsyncExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn hook(mut self, registration: HookRegistration) -> Self {
        self.hooks.push(registration);
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut config = self.config;
        validate_base_url(&config.base_url)?;
        if config.cache.user_isolated && config.user_scope.as_deref().map_or(true, str::is_empty) {
            return Err(Error::configuration(
                "user-isolated caching requires a user scope",
            ));
        }
        if config.cache.key_prefix.is_empty() {
            config.cache.key_prefix = config.identity.clone();
        }
        config.transport.connect_timeout = config.transport.connect_timeout.min(config.timeout);
        config.transport.accept_invalid_certs = !config.verify_tls;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config.transport)?),
        };
        let backend: Arc<dyn CacheBackend> = match self.cache_backend {
            Some(b) => b,
            None if config.cache.enabled => Arc::new(MemoryCache::new(config.cache_capacity)),
            None => Arc::new(NullCache::new()),
        };
        let mut cache = CacheManager::new(config.cache.clone(), backend);
        if let Some(observer) = self.cache_observer {
            cache = cache.with_observer(observer);
        }
        if let Some(predicate) = self.store_predicate {
            cache = cache.with_store_predicate(predicate);
        }

        let hooks = Arc::new(HookPipeline::new());
        for registration in self.hooks {
            hooks.register(registration);
        }

        let executor: Arc<dyn AsyncExecutor> = match self.executor {
            Some(e) => e,
            None => Arc::new(
                TaskPoolExecutor::new(config.max_workers)
                    .with_wait_timeout(config.batch_timeout)
                    .with_cancel_on_timeout(config.cancel_on_timeout),
            ),
        };

        let sanitizer = config.sanitizer();
        info!(
            client = %config.identity,
            base_url = %sanitizer.url(&config.base_url),
            transport = transport.name(),
            auth = self.authenticator.as_ref().map_or("none", |a| a.name()),
            verify_tls = config.verify_tls,
            cache = cache.backend_name(),
            max_workers = config.max_workers,
            "client built"
        );

        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher {
            key_builder: CacheKeyBuilder::new(config.identity.clone(), config.base_url.clone()),
            config,
            transport,
            authenticator: self.authenticator,
            cache: Arc::new(cache),
            hooks,
            parser: self.parser.unwrap_or_else(|| Arc::new(JsonParser)),
            request_validator: self.request_validator,
            response_validators: self.response_validators,
            formatter: self.formatter.unwrap_or_else(|| Arc::new(DefaultFormatter)),
            sanitizer,
        });
        let batch = BatchCoordinator::new(dispatcher.clone(), executor);
        Ok(Client::from_parts(dispatcher, Arc::new(batch)))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn validate_base_url(base_url: &str) -> Result<()> {
    if base_url.trim().is_empty() {
        return Err(Error::configuration("base_url is required"));
    }
    let parsed = url::Url::parse(base_url)
        .map_err(|e| Error::configuration(format!("invalid base_url '{}': {}", base_url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::configuration(format!(
            "unsupported base_url scheme '{}'",
            other
        ))),
    }
}
