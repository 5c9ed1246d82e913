//! 传输层模块：执行单个已构建的 HTTP 请求。
//!
//! # Transport Module
//!
//! The orchestration core never talks to the network directly; it hands a
//! fully-formed [`PreparedRequest`] to a [`Transport`] and receives a
//! [`RawResponse`] back. [`HttpTransport`] is the production implementation
//! on top of `reqwest`; tests substitute in-process doubles.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Transport`] | Executes one request |
//! | [`HttpTransport`] | `reqwest` implementation with a pooled client |
//! | [`TransportConfig`] | Pool, proxy and timeout settings |
//! | [`RawResponse`] | Status, headers and buffered or streamed body |
//! | [`Authenticator`] | Credentials applied before send ([`BasicAuth`], [`BearerAuth`]) |

mod auth;
mod http;

pub use auth::{set_authorization, Authenticator, BasicAuth, BearerAuth};
pub use http::{HttpTransport, TransportConfig};

use crate::types::{FilePart, Method, Params};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

/// Streaming response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart { fields: Params, files: Vec<FilePart> },
}

/// A request with URL, headers and body fully resolved.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request_id: String,
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
    /// Leave the response body unread and hand it back as a stream.
    pub stream: bool,
}

pub enum ResponseBody {
    Buffered(Bytes),
    Stream(BodyStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Buffered(b) => f.debug_tuple("Buffered").field(&b.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Final URL after redirects
    pub url: String,
    pub body: ResponseBody,
}

impl RawResponse {
    pub fn buffered(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            url: String::new(),
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self::buffered(status, value.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Read the whole body, draining the stream if there is one.
    pub async fn into_bytes(self) -> std::result::Result<Bytes, TransportError> {
        match self.body {
            ResponseBody::Buffered(b) => Ok(b),
            ResponseBody::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

/// Executes a single fully-formed request.
///
/// Implementations own their connection resources; the pool is released
/// when the transport is dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> std::result::Result<RawResponse, TransportError>;

    fn name(&self) -> &'static str {
        "custom"
    }
}
