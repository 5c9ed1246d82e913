//! Uniform response envelope.

use crate::error::{Error, ErrorKind};
use crate::transport::BodyStream;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Status, headers and body of a response, kept as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub url: String,
    pub body: Bytes,
}

/// Take-once handle on a streaming response body.
///
/// Clones share the same underlying stream; whichever clone calls
/// [`StreamHandle::take`] first receives it.
#[derive(Clone)]
pub struct StreamHandle(Arc<Mutex<Option<BodyStream>>>);

impl StreamHandle {
    pub fn new(stream: BodyStream) -> Self {
        Self(Arc::new(Mutex::new(Some(stream))))
    }

    pub fn take(&self) -> Option<BodyStream> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn is_taken(&self) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("taken", &self.is_taken())
            .finish()
    }
}

impl PartialEq for StreamHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Parsed data carried by an envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
    Raw(RawPayload),
    /// Path of a file written by the file-writing parser
    File(PathBuf),
    #[serde(skip)]
    Stream(StreamHandle),
}

impl Payload {
    /// Live streams cannot be replayed, so they never enter the cache.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Payload::Stream(_))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// JSON view of the payload; binary data is base64 encoded.
    pub fn to_json(&self) -> Value {
        let b64 = base64::engine::general_purpose::STANDARD;
        match self {
            Payload::Empty | Payload::Stream(_) => Value::Null,
            Payload::Json(v) => v.clone(),
            Payload::Text(s) => Value::String(s.clone()),
            Payload::Bytes(b) => Value::String(b64.encode(b)),
            Payload::Raw(raw) => json!({
                "status": raw.status,
                "headers": raw.headers,
                "url": raw.url,
                "body": b64.encode(&raw.body),
            }),
            Payload::File(path) => Value::String(path.display().to_string()),
        }
    }
}

/// Uniform result shape returned for every dispatch.
///
/// `result` is true iff the call completed and passed every response
/// validator. On failure `code` is the HTTP status when one was received,
/// otherwise one of the negative codes in [`crate::error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub result: bool,
    pub code: i32,
    pub message: String,
    pub data: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(status: u16, data: Payload) -> Self {
        Self {
            result: true,
            code: i32::from(status),
            message: reason_phrase(status).to_string(),
            data,
            error_kind: None,
            details: None,
        }
    }

    pub fn failure(code: i32, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            result: false,
            code,
            message: message.into(),
            data: Payload::Empty,
            error_kind: Some(kind),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    /// Failed envelope describing `err`.
    pub fn from_error(err: &Error) -> Self {
        let env = Self::failure(err.envelope_code(), err.to_string(), err.kind());
        let details = match err {
            Error::RequestValidation { errors, .. } => Some(json!(errors)),
            Error::ResponseValidation { details, .. } => details.clone(),
            Error::Http {
                body: Some(body), ..
            } => Some(Value::String(body.clone())),
            _ => None,
        };
        match details {
            Some(d) => env.with_details(d),
            None => env,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result
    }

    /// Flat `{result, code, message, data}` view.
    pub fn to_json(&self) -> Value {
        json!({
            "result": self.result,
            "code": self.code,
            "message": self.message,
            "data": self.data.to_json(),
        })
    }

    /// Take the body stream out of a streaming envelope.
    pub fn take_stream(&self) -> Option<BodyStream> {
        match &self.data {
            Payload::Stream(handle) => handle.take(),
            _ => None,
        }
    }
}

pub(crate) fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}
