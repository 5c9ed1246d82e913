//! Envelope formatting.

use crate::types::{Method, ResponseEnvelope};
use crate::{Error, Result};

/// Facts about the dispatch being formatted.
#[derive(Debug, Clone)]
pub struct FormatContext {
    pub request_id: String,
    pub method: Method,
    pub url: String,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
}

/// Shapes the final envelope.
///
/// `envelope` is the result built so far (success payload or failure
/// description); `error` is set on the failure path. A formatter error turns
/// the result into a failed envelope with code `-3`.
pub trait ResponseFormatter: Send + Sync {
    fn format(
        &self,
        envelope: ResponseEnvelope,
        error: Option<&Error>,
        ctx: &FormatContext,
    ) -> Result<ResponseEnvelope>;
}

impl<F> ResponseFormatter for F
where
    F: Fn(ResponseEnvelope, Option<&Error>, &FormatContext) -> Result<ResponseEnvelope> + Send + Sync,
{
    fn format(
        &self,
        envelope: ResponseEnvelope,
        error: Option<&Error>,
        ctx: &FormatContext,
    ) -> Result<ResponseEnvelope> {
        self(envelope, error, ctx)
    }
}

/// Returns the `{result, code, message, data}` envelope as built.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl ResponseFormatter for DefaultFormatter {
    fn format(
        &self,
        envelope: ResponseEnvelope,
        _error: Option<&Error>,
        _ctx: &FormatContext,
    ) -> Result<ResponseEnvelope> {
        Ok(envelope)
    }
}
