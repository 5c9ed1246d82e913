//! Cache key derivation.

use crate::request::endpoint::{join_url, render_endpoint};
use crate::types::{Method, Params};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Headers that change the representation a server returns.
pub const DEFAULT_RELEVANT_HEADERS: [&str; 3] = ["accept", "accept-language", "content-type"];

/// Opaque cache key. Equal keys identify semantically identical requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    /// Present only under user-isolated caching
    pub user_scope: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            user_scope: None,
        }
    }

    pub fn with_user_scope(mut self, scope: impl Into<String>) -> Self {
        self.user_scope = Some(scope.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.user_scope {
            Some(ref scope) => write!(f, "{}:{}", scope, self.hash),
            None => write!(f, "{}", self.hash),
        }
    }
}

/// Derives cache keys from
/// `(client identity, method, resolved URL, canonical params, relevant headers, user scope?)`.
///
/// Placeholder values enter the hash through the resolved URL; only the
/// leftover params are hashed as params.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    client_identity: String,
    base_url: String,
    relevant_headers: Vec<String>,
}

impl CacheKeyBuilder {
    pub fn new(client_identity: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client_identity: client_identity.into(),
            base_url: base_url.into(),
            relevant_headers: DEFAULT_RELEVANT_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn with_relevant_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.relevant_headers = headers
            .into_iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Build the key for one request.
    ///
    /// Pass `user_scope` only when user-isolated caching is enabled. Fails
    /// with a request-build error if a placeholder of `endpoint_template`
    /// has no value in `params`.
    pub fn build(
        &self,
        method: Method,
        endpoint_template: &str,
        params: &Params,
        headers: &BTreeMap<String, String>,
        user_scope: Option<&str>,
    ) -> Result<CacheKey> {
        let rendered = render_endpoint(endpoint_template, params)?;
        let url = join_url(&self.base_url, &rendered.path);

        let relevant: serde_json::Map<String, Value> = headers
            .iter()
            .filter_map(|(k, v)| {
                let k = k.to_ascii_lowercase();
                self.relevant_headers
                    .contains(&k)
                    .then(|| (k, Value::String(v.clone())))
            })
            .collect();

        let mut doc = serde_json::Map::new();
        doc.insert("client".into(), Value::String(self.client_identity.clone()));
        doc.insert("method".into(), Value::String(method.as_str().to_string()));
        doc.insert("url".into(), Value::String(url));
        doc.insert("params".into(), Value::Object(rendered.remaining));
        doc.insert("headers".into(), Value::Object(relevant));
        if let Some(scope) = user_scope {
            doc.insert("user".into(), Value::String(scope.to_string()));
        }

        let mut canonical = String::new();
        write_canonical(&Value::Object(doc), &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        let key = CacheKey::new(hash);
        Ok(match user_scope {
            Some(scope) => key.with_user_scope(scope),
            None => key,
        })
    }
}

/// Deterministic JSON text: object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder::new("PostsClient", "https://api.test")
    }

    fn params(pairs: &[(&str, Value)]) -> Params {
        let mut p = Params::new();
        for (k, v) in pairs {
            p.insert(k.to_string(), v.clone());
        }
        p
    }

    #[test]
    fn test_key_ignores_param_order() {
        let a = params(&[("a", json!(1)), ("b", json!({"y": 2, "x": [1, 2]}))]);
        let b = params(&[("b", json!({"x": [1, 2], "y": 2})), ("a", json!(1))]);
        let h = BTreeMap::new();
        let ka = builder().build(Method::Get, "/items", &a, &h, None).unwrap();
        let kb = builder().build(Method::Get, "/items", &b, &h, None).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka.hash.len(), 64);
    }

    #[test]
    fn test_user_isolation() {
        let p = params(&[("post_id", json!(1))]);
        let h = BTreeMap::new();
        let alice = builder().build(Method::Get, "/posts/{post_id}", &p, &h, Some("alice")).unwrap();
        let bob = builder().build(Method::Get, "/posts/{post_id}", &p, &h, Some("bob")).unwrap();
        assert_ne!(alice, bob);

        let shared_a = builder().build(Method::Get, "/posts/{post_id}", &p, &h, None).unwrap();
        let shared_b = builder().build(Method::Get, "/posts/{post_id}", &p, &h, None).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn test_placeholders_hash_through_resolved_url() {
        let h = BTreeMap::new();
        let one = builder()
            .build(Method::Get, "/posts/{post_id}", &params(&[("post_id", json!(1))]), &h, None)
            .unwrap();
        let literal = builder().build(Method::Get, "/posts/1", &Params::new(), &h, None).unwrap();
        assert_eq!(one, literal);
    }

    #[test]
    fn test_method_and_identity_distinguish_keys() {
        let h = BTreeMap::new();
        let p = Params::new();
        let get = builder().build(Method::Get, "/x", &p, &h, None).unwrap();
        let head = builder().build(Method::Head, "/x", &p, &h, None).unwrap();
        let other = CacheKeyBuilder::new("OtherClient", "https://api.test")
            .build(Method::Get, "/x", &p, &h, None)
            .unwrap();
        assert_ne!(get, head);
        assert_ne!(get, other);
    }

    #[test]
    fn test_only_relevant_headers_count() {
        let p = Params::new();
        let mut h1 = BTreeMap::new();
        h1.insert("Accept".to_string(), "application/json".to_string());
        let mut h2 = h1.clone();
        h2.insert("X-Trace".to_string(), "abc".to_string());
        let mut h3 = BTreeMap::new();
        h3.insert("accept".to_string(), "text/html".to_string());

        let k1 = builder().build(Method::Get, "/x", &p, &h1, None).unwrap();
        let k2 = builder().build(Method::Get, "/x", &p, &h2, None).unwrap();
        let k3 = builder().build(Method::Get, "/x", &p, &h3, None).unwrap();
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_missing_placeholder_fails_build() {
        let err = builder()
            .build(Method::Get, "/posts/{post_id}", &Params::new(), &BTreeMap::new(), None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::RequestBuild);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        assert_eq!(
            canonical_json(&json!({"b": {"d": 1, "c": [true, null]}, "a": "s"})),
            r#"{"a":"s","b":{"c":[true,null],"d":1}}"#
        );
    }
}
