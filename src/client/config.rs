//! Client configuration.

use crate::cache::{CacheConfig, DEFAULT_MEMORY_CAPACITY};
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;
use crate::types::Method;
use crate::utils::{default_sensitive_headers, default_sensitive_params, Sanitizer};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_IDENTITY: &str = "httpflex";

/// Immutable settings of one client, produced by
/// [`ClientBuilder`](crate::client::ClientBuilder).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name of the client type; part of every cache key and the default
    /// cache prefix.
    pub identity: String,
    pub base_url: String,
    /// Default endpoint template, e.g. `/posts/{post_id}`
    pub endpoint: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    /// Per-attempt network timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// In-flight ceiling for concurrent batches
    pub max_workers: usize,
    pub cache: CacheConfig,
    pub cache_capacity: usize,
    pub user_scope: Option<String>,
    pub sanitize_logs: bool,
    pub sensitive_headers: BTreeSet<String>,
    pub sensitive_params: BTreeSet<String>,
    /// Single requests return `Err` instead of a failed envelope.
    pub raise_on_error: bool,
    /// Collapse batch items sharing a cache key into one dispatch.
    pub deduplicate: bool,
    /// Overall wait bound for a concurrent batch
    pub batch_timeout: Option<Duration>,
    pub cancel_on_timeout: bool,
    /// Verify TLS certificates of the server.
    pub verify_tls: bool,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            base_url: String::new(),
            endpoint: String::new(),
            method: Method::Get,
            headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            cache: CacheConfig::default(),
            cache_capacity: DEFAULT_MEMORY_CAPACITY,
            user_scope: None,
            sanitize_logs: true,
            sensitive_headers: default_sensitive_headers(),
            sensitive_params: default_sensitive_params(),
            raise_on_error: false,
            deduplicate: true,
            batch_timeout: None,
            cancel_on_timeout: true,
            verify_tls: true,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn sanitizer(&self) -> Sanitizer {
        Sanitizer {
            enabled: self.sanitize_logs,
            headers: self.sensitive_headers.clone(),
            params: self.sensitive_params.clone(),
        }
    }

    /// Client default headers overlaid with per-request ones.
    ///
    /// Header names compare case-insensitively; the request's spelling wins.
    pub fn merged_headers(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = self.headers.clone();
        for (name, value) in overrides {
            merged.retain(|k, _| !k.eq_ignore_ascii_case(name));
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_workers, 10);
        assert!(cfg.retry.enabled);
        assert_eq!(cfg.retry.max_retries, 3);
        assert!(cfg.deduplicate);
        assert!(!cfg.raise_on_error);
        assert!(cfg.verify_tls);
        assert!(cfg.sanitizer().enabled);
    }

    #[test]
    fn test_request_headers_override_defaults() {
        let mut cfg = ClientConfig::default();
        cfg.headers.insert("Accept".into(), "application/json".into());
        cfg.headers.insert("X-Client".into(), "a".into());

        let mut overrides = BTreeMap::new();
        overrides.insert("accept".to_string(), "text/plain".to_string());
        let merged = cfg.merged_headers(&overrides);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["accept"], "text/plain");
        assert_eq!(merged["X-Client"], "a");
    }
}
