//! Request description types.

use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Parameter mapping of a logical request.
pub type Params = serde_json::Map<String, Value>;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
        }
    }

    /// Whether leftover params travel as a JSON body rather than a query string.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            other => Err(Error::request_build(format!(
                "unsupported HTTP method '{}'",
                other
            ))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Trace => reqwest::Method::TRACE,
        }
    }
}

/// A file attached to a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Form field name
    pub field: String,
    pub file_name: String,
    pub content: Bytes,
    pub mime: Option<String>,
}

impl FilePart {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content: content.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Per-call cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read from and write to the cache.
    #[default]
    Default,
    /// Neither read nor write.
    Bypass,
    /// Skip the read, overwrite the entry on success.
    Refresh,
}

impl CacheMode {
    pub fn reads(&self) -> bool {
        matches!(self, CacheMode::Default)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, CacheMode::Bypass)
    }
}

/// One logical request.
///
/// `params` feed endpoint placeholders first; leftover keys become the query
/// string or JSON body depending on the method. Every other field overrides
/// the client configuration for this call only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSpec {
    pub params: Params,
    pub endpoint: Option<String>,
    pub method: Option<Method>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub files: Vec<FilePart>,
    /// Target file name for the file-writing parser
    pub filename: Option<String>,
}

impl RequestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object. Anything else is a request-build failure.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(params) => Ok(Self::from(params)),
            Value::Null => Ok(Self::new()),
            other => Err(Error::request_build(format!(
                "request params must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }
}

impl From<Params> for RequestSpec {
    fn from(params: Params) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }
}

impl TryFrom<Value> for RequestSpec {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing_is_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(" Patch ".parse::<Method>().unwrap(), Method::Patch);
        assert!("FETCH".parse::<Method>().is_err());
    }

    #[test]
    fn test_body_methods() {
        assert!(Method::Post.carries_body());
        assert!(Method::Put.carries_body());
        assert!(!Method::Get.carries_body());
        assert!(!Method::Delete.carries_body());
    }

    #[test]
    fn test_spec_from_value() {
        let spec = RequestSpec::from_value(json!({"post_id": 1})).unwrap();
        assert_eq!(spec.params["post_id"], json!(1));
        assert!(spec.method.is_none());

        let err = RequestSpec::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::RequestBuild);
    }

    #[test]
    fn test_cache_mode_flags() {
        assert!(CacheMode::Default.reads() && CacheMode::Default.writes());
        assert!(!CacheMode::Refresh.reads() && CacheMode::Refresh.writes());
        assert!(!CacheMode::Bypass.reads() && !CacheMode::Bypass.writes());
    }
}
