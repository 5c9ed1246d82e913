use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field-level validation errors: `{field: [messages]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Envelope code used for failures that never produced an HTTP status
/// (network errors, timeouts, validation, hooks).
pub const CODE_NON_HTTP_ERROR: i32 = -1;
/// Envelope code used when a worker produced an unexpected outcome (panic, lost task).
pub const CODE_UNEXPECTED_OUTCOME: i32 = -2;
/// Envelope code used when the configured formatter failed.
pub const CODE_FORMATTING_ERROR: i32 = -3;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Request id of the dispatch that failed (e.g. `REQ-1700000000000-1a2b3c4d-0`)
    pub request_id: Option<String>,
    /// Field path or parameter name that caused the error (e.g. `params.post_id`)
    pub field_path: Option<String>,
    /// HTTP status code, when a response was received
    pub status_code: Option<u16>,
    /// Additional context about the error
    pub details: Option<String>,
    /// Source of the error (e.g. "endpoint_renderer", "response_validator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Copyable discriminant of [`Error`], used by retry decisions and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RequestBuild,
    RequestValidation,
    Network,
    Timeout,
    Http,
    Parse,
    ResponseValidation,
    Hook,
    CacheBackend,
    Formatting,
    Configuration,
    Executor,
    Io,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RequestBuild => "request_build",
            ErrorKind::RequestValidation => "request_validation",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Http => "http",
            ErrorKind::Parse => "parse",
            ErrorKind::ResponseValidation => "response_validation",
            ErrorKind::Hook => "hook",
            ErrorKind::CacheBackend => "cache_backend",
            ErrorKind::Formatting => "formatting",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Executor => "executor",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for request orchestration.
///
/// Every stage of a dispatch maps its failures onto one of these categories;
/// the category decides whether the failure is retried and how it is
/// represented in a [`ResponseEnvelope`](crate::ResponseEnvelope).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Request build error: {message}{}", format_context(.context))]
    RequestBuild {
        message: String,
        context: ErrorContext,
    },

    #[error("Request validation failed: {message}{}", format_field_errors(.errors))]
    RequestValidation {
        message: String,
        errors: FieldErrors,
        context: ErrorContext,
    },

    #[error("Network error: {message}{}", format_context(.context))]
    Network {
        message: String,
        context: ErrorContext,
    },

    #[error("Request timed out: {message}{}", format_context(.context))]
    Timeout {
        message: String,
        context: ErrorContext,
    },

    #[error("HTTP {status}: {reason}")]
    Http {
        status: u16,
        reason: String,
        body: Option<String>,
        context: ErrorContext,
    },

    #[error("Parsing failed: {message}")]
    Parse {
        message: String,
        status: Option<u16>,
        context: ErrorContext,
    },

    #[error("Response validation failed: {message}")]
    ResponseValidation {
        message: String,
        status: Option<u16>,
        details: Option<serde_json::Value>,
        context: ErrorContext,
    },

    #[error("Hook '{hook}' failed: {message}")]
    Hook {
        hook: String,
        message: String,
        context: ErrorContext,
    },

    #[error("Cache backend error: {message}{}", format_context(.context))]
    CacheBackend {
        message: String,
        context: ErrorContext,
    },

    #[error("Formatting failed: {message}")]
    Formatting { message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Executor error: {message}{}", format_context(.context))]
    Executor {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref id) = ctx.request_id {
        parts.push(format!("request: {}", id));
    }
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_field_errors(errors: &FieldErrors) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = errors
        .iter()
        .map(|(field, msgs)| format!("{}: {}", field, msgs.join("; ")))
        .collect();
    format!(" ({})", parts.join(", "))
}

impl Error {
    pub fn request_build(msg: impl Into<String>) -> Self {
        Error::RequestBuild {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn request_build_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::RequestBuild {
            message: msg.into(),
            context,
        }
    }

    pub fn request_validation(msg: impl Into<String>, errors: FieldErrors) -> Self {
        Error::RequestValidation {
            message: msg.into(),
            errors,
            context: ErrorContext::new(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn http(status: u16, body: Option<String>) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
            .to_string();
        Error::Http {
            status,
            reason,
            body,
            context: ErrorContext::new().with_status_code(status),
        }
    }

    pub fn parse(msg: impl Into<String>, status: Option<u16>) -> Self {
        Error::Parse {
            message: msg.into(),
            status,
            context: ErrorContext::new(),
        }
    }

    pub fn response_validation(
        msg: impl Into<String>,
        status: Option<u16>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Error::ResponseValidation {
            message: msg.into(),
            status,
            details,
            context: ErrorContext::new(),
        }
    }

    pub fn hook(hook: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Hook {
            hook: hook.into(),
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn cache_backend(msg: impl Into<String>) -> Self {
        Error::CacheBackend {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn executor(msg: impl Into<String>) -> Self {
        Error::Executor {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn formatting(msg: impl Into<String>) -> Self {
        Error::Formatting { message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RequestBuild { .. } => ErrorKind::RequestBuild,
            Error::RequestValidation { .. } => ErrorKind::RequestValidation,
            Error::Network { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Http { .. } => ErrorKind::Http,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::ResponseValidation { .. } => ErrorKind::ResponseValidation,
            Error::Hook { .. } => ErrorKind::Hook,
            Error::CacheBackend { .. } => ErrorKind::CacheBackend,
            Error::Formatting { .. } => ErrorKind::Formatting,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Executor { .. } => ErrorKind::Executor,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// HTTP status associated with this error, if a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Parse { status, .. } | Error::ResponseValidation { status, .. } => *status,
            _ => self.context().and_then(|c| c.status_code),
        }
    }

    /// Code used when this error is turned into a failed envelope.
    pub fn envelope_code(&self) -> i32 {
        match self {
            Error::Formatting { .. } => CODE_FORMATTING_ERROR,
            Error::Executor { .. } => CODE_UNEXPECTED_OUTCOME,
            _ => self
                .status_code()
                .map(i32::from)
                .unwrap_or(CODE_NON_HTTP_ERROR),
        }
    }

    /// Field map carried by request validation errors.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Error::RequestValidation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::RequestBuild { context, .. }
            | Error::RequestValidation { context, .. }
            | Error::Network { context, .. }
            | Error::Timeout { context, .. }
            | Error::Http { context, .. }
            | Error::Parse { context, .. }
            | Error::ResponseValidation { context, .. }
            | Error::Hook { context, .. }
            | Error::CacheBackend { context, .. }
            | Error::Configuration { context, .. }
            | Error::Executor { context, .. } => Some(context),
            Error::Formatting { .. } | Error::Io(_) | Error::Serialization(_) => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Error::RequestBuild { context, .. }
            | Error::RequestValidation { context, .. }
            | Error::Network { context, .. }
            | Error::Timeout { context, .. }
            | Error::Http { context, .. }
            | Error::Parse { context, .. }
            | Error::ResponseValidation { context, .. }
            | Error::Hook { context, .. }
            | Error::CacheBackend { context, .. }
            | Error::Configuration { context, .. }
            | Error::Executor { context, .. } => Some(context),
            Error::Formatting { .. } | Error::Io(_) | Error::Serialization(_) => None,
        }
    }

    /// Attach the request id of the failing dispatch.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        if let Some(ctx) = self.context_mut() {
            ctx.request_id = Some(id.into());
        }
        self
    }

    /// Request id of the failing dispatch, when known.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => Error::timeout(msg),
            TransportError::Http(e) if e.is_timeout() => Error::timeout(e.to_string()),
            TransportError::Connect(msg) => Error::Network {
                message: msg,
                context: ErrorContext::new().with_source("transport"),
            },
            TransportError::Http(e) => Error::Network {
                message: e.to_string(),
                context: ErrorContext::new().with_source("transport"),
            },
            TransportError::Other(msg) => Error::Network {
                message: msg,
                context: ErrorContext::new().with_source("transport"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_uses_status_as_envelope_code() {
        let err = Error::http(503, Some("upstream down".into()));
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.envelope_code(), 503);
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }

    #[test]
    fn test_non_http_errors_use_negative_codes() {
        assert_eq!(Error::network("refused").envelope_code(), CODE_NON_HTTP_ERROR);
        assert_eq!(Error::timeout("30s").envelope_code(), CODE_NON_HTTP_ERROR);
        assert_eq!(
            Error::executor("worker panicked").envelope_code(),
            CODE_UNEXPECTED_OUTCOME
        );
        assert_eq!(
            Error::Formatting {
                message: "bad".into()
            }
            .envelope_code(),
            CODE_FORMATTING_ERROR
        );
    }

    #[test]
    fn test_parse_error_retains_status() {
        let err = Error::parse("expected value at line 1", Some(200));
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.envelope_code(), 200);
    }

    #[test]
    fn test_field_errors_in_display() {
        let mut errors = FieldErrors::new();
        errors.insert("email".into(), vec!["This field is required.".into()]);
        let err = Error::request_validation("invalid request", errors);
        assert_eq!(
            err.to_string(),
            "Request validation failed: invalid request (email: This field is required.)"
        );
        assert_eq!(err.field_errors().map(|e| e.len()), Some(1));
    }

    #[test]
    fn test_request_id_attached_to_context() {
        let err = Error::request_build("missing placeholder 'post_id'").with_request_id("REQ-1");
        assert_eq!(err.request_id(), Some("REQ-1"));
        assert!(err.to_string().contains("request: REQ-1"));
    }

    #[test]
    fn test_transport_timeout_maps_to_timeout_kind() {
        let err: Error = TransportError::Timeout("after 5s".into()).into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let err: Error = TransportError::Connect("refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
