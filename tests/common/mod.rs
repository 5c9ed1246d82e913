//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use httpflex::transport::{PreparedRequest, RawResponse, RequestBody, Transport, TransportError};
use httpflex::{Client, ClientBuilder, RetryPolicy};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "https://api.test";

pub type Responder =
    Arc<dyn Fn(&PreparedRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync>;
pub type DelayFn = Arc<dyn Fn(&PreparedRequest) -> Duration + Send + Sync>;

/// In-process transport that counts calls and answers from a script.
///
/// The responder receives the request and the 1-based call number.
pub struct ScriptedTransport {
    responder: Responder,
    delay: Option<DelayFn>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&PreparedRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `200` with `{"id": <last path segment>, "title": "post <id>"}`.
    pub fn posts() -> Self {
        Self::new(|req: &PreparedRequest, _| {
            let id: i64 = last_segment(&req.url).parse().unwrap_or(0);
            Ok(
                RawResponse::json(200, &json!({"id": id, "title": format!("post {}", id)}))
                    .with_url(req.url.clone()),
            )
        })
    }

    /// Always answers with `status` and an empty JSON object.
    pub fn status(status: u16) -> Self {
        Self::new(move |_: &PreparedRequest, _| {
            Ok(RawResponse::json(status, &json!({})))
        })
    }

    /// Echoes method, URL, query and body back as JSON.
    pub fn echo() -> Self {
        Self::new(|req: &PreparedRequest, _| {
            let body = match &req.body {
                RequestBody::Json(v) => v.clone(),
                _ => Value::Null,
            };
            Ok(RawResponse::json(
                200,
                &json!({
                    "method": req.method.as_str(),
                    "url": req.url,
                    "query": req.query,
                    "body": body,
                }),
            ))
        })
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&PreparedRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(ref delay) = self.delay {
            tokio::time::sleep(delay(request)).await;
        }
        let out = (self.responder)(request, call);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or_default()
}

/// Posts endpoint with no backoff between retries.
pub fn builder(transport: Arc<ScriptedTransport>) -> ClientBuilder {
    Client::builder()
        .identity("PostsClient")
        .base_url(BASE_URL)
        .endpoint("/posts/{post_id}")
        .retry_policy(RetryPolicy::default().with_backoff(Duration::ZERO, 2.0))
        .transport(transport)
}

pub fn client(transport: Arc<ScriptedTransport>) -> Client {
    builder(transport).build().unwrap()
}
