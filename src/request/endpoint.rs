//! Endpoint templating and URL assembly.

use crate::types::Params;
use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// An endpoint with every placeholder substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEndpoint {
    pub path: String,
    /// Params not consumed by placeholders
    pub remaining: Params,
}

/// Names of the `{placeholder}`s in a template, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute `{name}` placeholders from `params`.
///
/// Consumed keys are removed from the returned `remaining` map. A
/// placeholder with no (or a null) value is a request-build failure.
pub fn render_endpoint(template: &str, params: &Params) -> Result<RenderedEndpoint> {
    let mut remaining = params.clone();
    let mut path = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let name = &caps[1];
        let value = match params.get(name) {
            Some(Value::Null) | None => {
                return Err(Error::request_build_with_context(
                    format!("missing value for endpoint placeholder '{}'", name),
                    ErrorContext::new()
                        .with_field_path(name)
                        .with_details(format!("endpoint: {}", template))
                        .with_source("endpoint_renderer"),
                ))
            }
            Some(v) => v,
        };
        path.push_str(&template[last..whole.start]);
        path.push_str(&value_to_string(value));
        last = whole.end;
        remaining.remove(name);
    }
    path.push_str(&template[last..]);

    Ok(RenderedEndpoint { path, remaining })
}

/// `base` without trailing `/` + `/` + `path` without leading `/`.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Flatten params into query pairs. Arrays repeat the key; nulls are dropped.
pub fn to_query_pairs(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (k, v) in params {
        match v {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|i| !i.is_null()) {
                    pairs.push((k.clone(), value_to_string(item)));
                }
            }
            other => pairs.push((k.clone(), value_to_string(other))),
        }
    }
    pairs
}

pub(crate) fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
