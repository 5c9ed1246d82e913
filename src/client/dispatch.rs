//! 单请求调度：校验、构建、缓存、发送、解析、格式化与钩子。
//!
//! Single-request execution. One [`Dispatcher::execute`] call is one full
//! dispatch lifecycle; it always resolves to an envelope.

use crate::cache::{CacheKey, CacheKeyBuilder, CacheManager};
use crate::client::ClientConfig;
use crate::hooks::{HookContext, HookPipeline};
use crate::request::{join_url, render_endpoint, to_query_pairs, RequestValidator};
use crate::response::{
    FormatContext, ParseContext, ResponseFormatter, ResponseMeta, ResponseParser, ValidatorChain,
};
use crate::transport::{Authenticator, PreparedRequest, RawResponse, RequestBody, Transport};
use crate::types::{CacheMode, Method, RequestSpec, ResponseEnvelope};
use crate::utils::{generate_request_id, Sanitizer};
use crate::{Error, ErrorKind, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-dispatch knobs set by the client or the batch coordinator.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub request_id: Option<String>,
    pub cache_mode: CacheMode,
    /// Key computed ahead of time by the batch coordinator
    pub cache_key: Option<CacheKey>,
    /// The cache was already consulted for this key; skip the read.
    pub cache_checked: bool,
    pub batch_index: Option<usize>,
}

/// Outcome of one dispatch. `error` is the failure the envelope describes.
#[derive(Debug)]
pub struct Dispatched {
    pub envelope: ResponseEnvelope,
    pub error: Option<Error>,
}

pub struct Dispatcher {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) key_builder: CacheKeyBuilder,
    pub(crate) hooks: Arc<HookPipeline>,
    pub(crate) parser: Arc<dyn ResponseParser>,
    pub(crate) request_validator: Option<Arc<dyn RequestValidator>>,
    pub(crate) response_validators: ValidatorChain,
    pub(crate) formatter: Arc<dyn ResponseFormatter>,
    pub(crate) sanitizer: Sanitizer,
}

impl Dispatcher {
    pub fn method_of(&self, spec: &RequestSpec) -> Method {
        spec.method.unwrap_or(self.config.method)
    }

    pub fn endpoint_of<'a>(&'a self, spec: &'a RequestSpec) -> &'a str {
        spec.endpoint.as_deref().unwrap_or(&self.config.endpoint)
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Cache key of `spec`, or `None` when its method is not cacheable.
    ///
    /// Keys are derived from the caller's params as given, before validation
    /// and hooks, so batch deduplication and single dispatches agree.
    pub fn cache_key(&self, spec: &RequestSpec) -> Result<Option<CacheKey>> {
        let method = self.method_of(spec);
        if !self.cache.is_cacheable_method(method) || !spec.files.is_empty() {
            return Ok(None);
        }
        let headers = self.config.merged_headers(&spec.headers);
        let scope = if self.cache.config().user_isolated {
            self.config.user_scope.as_deref()
        } else {
            None
        };
        self.key_builder
            .build(method, self.endpoint_of(spec), &spec.params, &headers, scope)
            .map(Some)
    }

    fn hook_context(&self, spec: &RequestSpec, opts: &DispatchOptions) -> HookContext {
        let request_id = opts.request_id.clone().unwrap_or_else(|| {
            generate_request_id(opts.batch_index.map(|i| i.to_string()).as_deref())
        });
        HookContext {
            request_id,
            client: self.config.identity.clone(),
            method: self.method_of(spec),
            endpoint: self.endpoint_of(spec).to_string(),
            batch_index: opts.batch_index,
        }
    }

    /// Run one dispatch to completion.
    pub async fn execute(&self, spec: RequestSpec, opts: DispatchOptions) -> Dispatched {
        let ctx = self.hook_context(&spec, &opts);
        match self.run(&spec, &ctx, &opts).await {
            Ok(envelope) => Dispatched {
                envelope,
                error: None,
            },
            Err(err) => self.fail(err, &ctx).await,
        }
    }

    /// Turn `err` into a failed envelope, notifying on-error hooks first.
    async fn fail(&self, err: Error, ctx: &HookContext) -> Dispatched {
        let err = err.with_request_id(ctx.request_id.clone());
        warn!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            kind = %err.kind(),
            code = err.envelope_code(),
            error = %err,
            "request failed"
        );
        self.hooks.run_on_error(ctx, &err).await;

        let envelope = ResponseEnvelope::from_error(&err);
        if err.kind() == ErrorKind::Formatting {
            return Dispatched {
                envelope,
                error: Some(err),
            };
        }
        let fctx = FormatContext {
            request_id: ctx.request_id.clone(),
            method: ctx.method,
            url: join_url(&self.config.base_url, &ctx.endpoint),
            status: err.status_code(),
        };
        match self.formatter.format(envelope, Some(&err), &fctx) {
            Ok(envelope) => Dispatched {
                envelope,
                error: Some(err),
            },
            Err(fmt_err) => {
                let fmt_err = Error::formatting(fmt_err.to_string()).with_request_id(ctx.request_id.clone());
                Dispatched {
                    envelope: ResponseEnvelope::from_error(&fmt_err),
                    error: Some(fmt_err),
                }
            }
        }
    }

    async fn run(&self, spec: &RequestSpec, ctx: &HookContext, opts: &DispatchOptions) -> Result<ResponseEnvelope> {
        let method = ctx.method;

        let mut params = spec.params.clone();
        if let Some(ref validator) = self.request_validator {
            params = validator.validate(params)?;
        }
        let logged_params = self.sanitizer.value(&serde_json::Value::Object(params.clone()));
        debug!(
            request_id = %ctx.request_id,
            params = %logged_params,
            headers = ?self.sanitizer.headers(&spec.headers),
            "request params validated"
        );

        self.hooks.run_before(ctx, &mut params).await?;

        let key = self.resolve_key(spec, ctx, opts);
        if let Some(ref key) = key {
            if opts.cache_mode.reads() && !opts.cache_checked {
                if let Some(cached) = self.cache.get(key).await {
                    debug!(request_id = %ctx.request_id, cache_key = %key, "served from cache");
                    self.hooks.run_after(ctx, &cached).await;
                    return Ok(cached);
                }
            }
        }

        let prepared = self.prepare(spec, ctx, params)?;
        let display_url = self.display_url(&prepared);
        info!(request_id = %ctx.request_id, method = %method, url = %display_url, "sending request");

        let response = self.send(&prepared).await?;
        info!(request_id = %ctx.request_id, status = response.status, "response received");

        let envelope = self.process(response, spec, ctx, &prepared).await?;

        if let Some(ref key) = key {
            if opts.cache_mode.writes() && self.cache.should_store(method, &envelope) {
                self.cache.set(key, &envelope).await;
            }
        }

        self.hooks.run_after(ctx, &envelope).await;
        Ok(envelope)
    }

    fn resolve_key(&self, spec: &RequestSpec, ctx: &HookContext, opts: &DispatchOptions) -> Option<CacheKey> {
        if opts.cache_mode == CacheMode::Bypass || !self.cache.is_enabled() {
            return None;
        }
        if let Some(ref key) = opts.cache_key {
            return Some(key.clone());
        }
        match self.cache_key(spec) {
            Ok(key) => key,
            Err(e) => {
                // Hooks may still supply the placeholder; rendering reports it otherwise.
                debug!(request_id = %ctx.request_id, error = %e, "no cache key for request");
                None
            }
        }
    }

    fn prepare(&self, spec: &RequestSpec, ctx: &HookContext, params: crate::types::Params) -> Result<PreparedRequest> {
        let rendered = render_endpoint(&ctx.endpoint, &params)?;
        let url = join_url(&self.config.base_url, &rendered.path);

        let (query, body) = if !spec.files.is_empty() {
            (
                Vec::new(),
                RequestBody::Multipart {
                    fields: rendered.remaining,
                    files: spec.files.clone(),
                },
            )
        } else if ctx.method.carries_body() {
            (Vec::new(), RequestBody::Json(Value::Object(rendered.remaining)))
        } else {
            (to_query_pairs(&rendered.remaining), RequestBody::Empty)
        };

        let mut prepared = PreparedRequest {
            request_id: ctx.request_id.clone(),
            method: ctx.method,
            url,
            headers: self.config.merged_headers(&spec.headers),
            query,
            body,
            timeout: spec.timeout.unwrap_or(self.config.timeout),
            stream: self.parser.streaming(),
        };
        if let Some(ref auth) = self.authenticator {
            auth.apply(&mut prepared)?;
        }
        Ok(prepared)
    }

    fn display_url(&self, prepared: &PreparedRequest) -> String {
        let full = if prepared.query.is_empty() {
            prepared.url.clone()
        } else {
            let qs = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(prepared.query.iter())
                .finish();
            format!("{}?{}", prepared.url, qs)
        };
        self.sanitizer.url(&full)
    }

    /// Send under the retry policy. Non-2xx responses become HTTP errors so
    /// the policy can judge their status.
    async fn send(&self, prepared: &PreparedRequest) -> Result<RawResponse> {
        let transport = &self.transport;
        self.config
            .retry
            .run(&prepared.request_id, move |attempt| async move {
                debug!(request_id = %prepared.request_id, attempt, "attempt started");
                let response = match tokio::time::timeout(prepared.timeout, transport.send(prepared)).await {
                    Ok(sent) => sent.map_err(Error::from)?,
                    Err(_) => {
                        return Err(Error::timeout(format!(
                            "no response within {} ms",
                            prepared.timeout.as_millis()
                        )))
                    }
                };
                if response.is_success() {
                    return Ok(response);
                }
                let status = response.status;
                let body = response
                    .into_bytes()
                    .await
                    .ok()
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .filter(|s| !s.is_empty());
                Err(Error::http(status, body))
            })
            .await
    }

    async fn process(
        &self,
        response: RawResponse,
        spec: &RequestSpec,
        ctx: &HookContext,
        prepared: &PreparedRequest,
    ) -> Result<ResponseEnvelope> {
        let status = response.status;
        let meta = ResponseMeta {
            status,
            headers: response.headers.clone(),
            url: response.url.clone(),
        };
        let pctx = ParseContext {
            request_id: ctx.request_id.clone(),
            url: if response.url.is_empty() {
                prepared.url.clone()
            } else {
                response.url.clone()
            },
            filename: spec.filename.clone(),
        };

        let payload = self.parser.parse(response, &pctx).await?;
        self.response_validators.validate(&meta, &payload)?;

        let fctx = FormatContext {
            request_id: ctx.request_id.clone(),
            method: ctx.method,
            url: prepared.url.clone(),
            status: Some(status),
        };
        self.formatter
            .format(ResponseEnvelope::success(status, payload), None, &fctx)
            .map_err(|e| Error::formatting(e.to_string()))
    }
}
