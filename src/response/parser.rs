//! Response parsing strategies.

use crate::transport::{BodyStream, RawResponse, ResponseBody};
use crate::types::{Payload, RawPayload, StreamHandle};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";
pub const DEFAULT_FILE_NAME: &str = "downloaded_file";

/// Request-side facts a parser may need.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub request_id: String,
    /// URL the request was sent to
    pub url: String,
    /// Target file name override from the request
    pub filename: Option<String>,
}

/// Turns a raw response into the envelope payload.
#[async_trait]
pub trait ResponseParser: Send + Sync {
    async fn parse(&self, response: RawResponse, ctx: &ParseContext) -> Result<Payload>;

    /// Whether the transport should leave the body unread.
    fn streaming(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

async fn read_body(response: RawResponse) -> Result<(u16, bytes::Bytes)> {
    let status = response.status;
    let body = response
        .into_bytes()
        .await
        .map_err(|e| Error::parse(format!("failed to read response body: {}", e), Some(status)))?;
    Ok((status, body))
}

/// Parses the body as JSON. An empty body yields [`Payload::Empty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

#[async_trait]
impl ResponseParser for JsonParser {
    async fn parse(&self, response: RawResponse, _ctx: &ParseContext) -> Result<Payload> {
        let (status, body) = read_body(response).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Payload::Empty);
        }
        serde_json::from_slice(&body)
            .map(Payload::Json)
            .map_err(|e| Error::parse(format!("invalid JSON body: {}", e), Some(status)))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Body as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

#[async_trait]
impl ResponseParser for TextParser {
    async fn parse(&self, response: RawResponse, _ctx: &ParseContext) -> Result<Payload> {
        let (status, body) = read_body(response).await?;
        String::from_utf8(body.to_vec())
            .map(Payload::Text)
            .map_err(|e| Error::parse(format!("body is not valid UTF-8: {}", e), Some(status)))
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// Body as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentParser;

#[async_trait]
impl ResponseParser for ContentParser {
    async fn parse(&self, response: RawResponse, _ctx: &ParseContext) -> Result<Payload> {
        let (_, body) = read_body(response).await?;
        Ok(Payload::Bytes(body))
    }

    fn name(&self) -> &'static str {
        "content"
    }
}

/// Status, headers, final URL and body, untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawParser;

#[async_trait]
impl ResponseParser for RawParser {
    async fn parse(&self, response: RawResponse, _ctx: &ParseContext) -> Result<Payload> {
        let headers = response.headers.clone();
        let url = response.url.clone();
        let (status, body) = read_body(response).await?;
        Ok(Payload::Raw(RawPayload {
            status,
            headers,
            url,
            body,
        }))
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

/// Hands the unread body to the caller through a take-once handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamParser;

#[async_trait]
impl ResponseParser for StreamParser {
    async fn parse(&self, response: RawResponse, _ctx: &ParseContext) -> Result<Payload> {
        let stream: BodyStream = match response.body {
            ResponseBody::Stream(s) => s,
            ResponseBody::Buffered(b) => Box::pin(futures::stream::once(async move { Ok(b) })),
        };
        Ok(Payload::Stream(StreamHandle::new(stream)))
    }

    fn streaming(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}

/// Streams the body into `<base_dir>/<file name>`.
///
/// The file name is the request's `filename` override, else the last path
/// segment of the response URL, else `default_name`; `suffix` is appended.
#[derive(Debug, Clone)]
pub struct FileWriteParser {
    pub base_dir: PathBuf,
    pub default_name: String,
    pub suffix: Option<String>,
    pub chunk_size: usize,
}

impl Default for FileWriteParser {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            default_name: DEFAULT_FILE_NAME.to_string(),
            suffix: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl FileWriteParser {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Resolve the target path for a response fetched from `url`.
    pub fn target_path(&self, filename: Option<&str>, url: &str) -> PathBuf {
        let name = filename
            .and_then(safe_file_name)
            .or_else(|| last_url_segment(url).as_deref().and_then(safe_file_name))
            .unwrap_or_else(|| self.default_name.clone());
        let name = match self.suffix {
            Some(ref suffix) => format!("{}{}", name, suffix),
            None => name,
        };
        self.base_dir.join(name)
    }
}

fn last_url_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(last.to_string())
}

/// Keep only the final path component so names cannot escape `base_dir`.
fn safe_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ResponseParser for FileWriteParser {
    async fn parse(&self, response: RawResponse, ctx: &ParseContext) -> Result<Payload> {
        let url = if response.url.is_empty() {
            ctx.url.clone()
        } else {
            response.url.clone()
        };
        let path = self.target_path(ctx.filename.as_deref(), &url);
        let status = response.status;

        let io_err = |e: std::io::Error| {
            Error::Parse {
                message: format!("failed to write {}: {}", path.display(), e),
                status: Some(status),
                context: ErrorContext::new()
                    .with_request_id(ctx.request_id.clone())
                    .with_source("file_write_parser"),
            }
        };

        tokio::fs::create_dir_all(&self.base_dir).await.map_err(io_err)?;
        let file = tokio::fs::File::create(&path).await.map_err(io_err)?;
        let mut writer = tokio::io::BufWriter::with_capacity(self.chunk_size.max(1), file);

        let mut written = 0usize;
        match response.body {
            ResponseBody::Buffered(b) => {
                writer.write_all(&b).await.map_err(io_err)?;
                written = b.len();
            }
            ResponseBody::Stream(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk
                        .map_err(|e| Error::parse(format!("download interrupted: {}", e), Some(status)))?;
                    writer.write_all(&chunk).await.map_err(io_err)?;
                    written += chunk.len();
                }
            }
        }
        writer.flush().await.map_err(io_err)?;

        debug!(request_id = %ctx.request_id, path = %path.display(), bytes = written, "response written to file");
        Ok(Payload::File(path))
    }

    fn streaming(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "file_write"
    }
}
