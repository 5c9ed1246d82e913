//! Masking of credentials in logged headers, URLs and parameter maps.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const MASK: &str = "***";

pub const DEFAULT_SENSITIVE_HEADERS: [&str; 8] = [
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "api-key",
    "auth-token",
    "session-id",
];

pub const DEFAULT_SENSITIVE_PARAMS: [&str; 10] = [
    "token",
    "password",
    "secret",
    "key",
    "api_key",
    "apikey",
    "access_token",
    "auth_token",
    "session",
    "pwd",
];

pub fn default_sensitive_headers() -> BTreeSet<String> {
    DEFAULT_SENSITIVE_HEADERS.iter().map(|s| s.to_string()).collect()
}

pub fn default_sensitive_params() -> BTreeSet<String> {
    DEFAULT_SENSITIVE_PARAMS.iter().map(|s| s.to_string()).collect()
}

fn is_sensitive(name: &str, keys: &BTreeSet<String>) -> bool {
    let lower = name.to_ascii_lowercase();
    keys.iter().any(|k| k.eq_ignore_ascii_case(&lower))
}

/// Copy of `headers` with sensitive values replaced by [`MASK`].
pub fn sanitize_headers(headers: &BTreeMap<String, String>, sensitive: &BTreeSet<String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            let v = if is_sensitive(k, sensitive) { MASK.to_string() } else { v.clone() };
            (k.clone(), v)
        })
        .collect()
}

/// Mask sensitive query parameters and any userinfo password.
///
/// Unparseable input is returned unchanged.
pub fn sanitize_url(raw: &str, sensitive: &BTreeSet<String>) -> String {
    let mut url = match url::Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_string(),
    };
    if url.password().is_some() {
        let _ = url.set_password(Some(MASK));
    }
    if url.query().is_some() {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if is_sensitive(&k, sensitive) { MASK.to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

/// Recursively mask values of sensitive keys in a JSON document.
pub fn sanitize_value(value: &Value, sensitive: &BTreeSet<String>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k, sensitive) {
                        Value::String(MASK.to_string())
                    } else {
                        sanitize_value(v, sensitive)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize_value(v, sensitive)).collect()),
        other => other.clone(),
    }
}

/// Replace every match of `pattern` in `text` with [`MASK`], keeping the
/// first `keep_prefix` and last `keep_suffix` characters of each match.
pub fn mask_pattern(text: &str, pattern: &Regex, keep_prefix: usize, keep_suffix: usize) -> String {
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let matched = &caps[0];
            let chars: Vec<char> = matched.chars().collect();
            if keep_prefix + keep_suffix >= chars.len() && (keep_prefix > 0 || keep_suffix > 0) {
                return matched.to_string();
            }
            let prefix: String = chars.iter().take(keep_prefix).collect();
            let suffix: String = chars[chars.len() - keep_suffix.min(chars.len())..].iter().collect();
            format!("{}{}{}", prefix, MASK, suffix)
        })
        .into_owned()
}

/// Masking settings applied to everything a client logs.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    pub enabled: bool,
    pub headers: BTreeSet<String>,
    pub params: BTreeSet<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            enabled: true,
            headers: default_sensitive_headers(),
            params: default_sensitive_params(),
        }
    }
}

impl Sanitizer {
    pub fn url(&self, url: &str) -> String {
        if self.enabled {
            sanitize_url(url, &self.params)
        } else {
            url.to_string()
        }
    }

    pub fn headers(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        if self.enabled {
            sanitize_headers(headers, &self.headers)
        } else {
            headers.clone()
        }
    }

    /// Params may carry header-like keys, so both sets apply.
    pub fn value(&self, value: &Value) -> Value {
        if self.enabled {
            let keys: BTreeSet<String> = self.headers.union(&self.params).cloned().collect();
            sanitize_value(value, &keys)
        } else {
            value.clone()
        }
    }
}
