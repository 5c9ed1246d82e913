use super::{BodyStream, PreparedRequest, RawResponse, RequestBody, ResponseBody, Transport, TransportError};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Proxy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 100;
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Settings for the pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on establishing a connection. Whole-request bounds come from
    /// each request's own timeout.
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
    pub user_agent: Option<String>,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: crate::client::DEFAULT_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            proxy_url: None,
            user_agent: Some(concat!("httpflex/", env!("CARGO_PKG_VERSION")).to_string()),
            accept_invalid_certs: false,
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout));

        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua.clone());
        }

        if let Some(ref proxy_url) = config.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| Error::configuration(format!("invalid proxy url '{}': {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_form(fields: &serde_json::Map<String, Value>, files: &[crate::types::FilePart]) -> std::result::Result<Form, TransportError> {
        let mut form = Form::new();
        for (name, value) in fields {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(name.clone(), text);
        }
        for file in files {
            let mut part = Part::bytes(file.content.to_vec()).file_name(file.file_name.clone());
            if let Some(ref mime) = file.mime {
                part = part.mime_str(mime)?;
            }
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Http(err)
    }
}

/// Wrap a body stream so each chunk must arrive within `idle`.
///
/// A slow but steady download never trips this; a stalled one ends with a
/// timeout error.
fn idle_bounded<S>(body: S, idle: Duration) -> BodyStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let body = Box::pin(body);
    Box::pin(futures::stream::unfold(Some(body), move |state| async move {
        let mut body = match state {
            Some(body) => body,
            None => return None,
        };
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(classify(e)), None)),
            Ok(None) => None,
            Err(_) => Some((
                Err(TransportError::Timeout(format!(
                    "no body data for {} ms",
                    idle.as_millis()
                ))),
                None,
            )),
        }
    }))
}

/// Collapse repeated header fields into one comma-joined value.
fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        out.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> std::result::Result<RawResponse, TransportError> {
        let mut req = self.client.request(request.method.into(), &request.url);
        // Streamed bodies are bounded per chunk instead; a whole-request
        // timeout would cut off long downloads that are still progressing.
        if !request.stream {
            req = req.timeout(request.timeout);
        }

        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        req = match &request.body {
            RequestBody::Empty => req,
            RequestBody::Json(body) => req.json(body),
            RequestBody::Multipart { fields, files } => req.multipart(Self::build_form(fields, files)?),
        };

        let resp = req.send().await.map_err(classify)?;

        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let headers = collect_headers(resp.headers());

        let body = if request.stream {
            ResponseBody::Stream(idle_bounded(resp.bytes_stream(), request.timeout))
        } else {
            ResponseBody::Buffered(resp.bytes().await.map_err(classify)?)
        };

        Ok(RawResponse {
            status,
            headers,
            url,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
