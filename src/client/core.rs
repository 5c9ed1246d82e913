use crate::batch::{BatchCoordinator, SequentialExecutor};
use crate::cache::CacheStats;
use crate::client::builder::ClientBuilder;
use crate::client::config::ClientConfig;
use crate::client::dispatch::{DispatchOptions, Dispatcher};
use crate::hooks::HookPipeline;
use crate::types::{CacheMode, Params, RequestSpec, ResponseEnvelope};
use crate::Result;
use std::sync::Arc;

/// One request or an ordered batch.
#[derive(Debug, Clone)]
pub enum RequestInput {
    Single(RequestSpec),
    Batch(Vec<RequestSpec>),
}

impl From<RequestSpec> for RequestInput {
    fn from(spec: RequestSpec) -> Self {
        RequestInput::Single(spec)
    }
}

impl From<Params> for RequestInput {
    fn from(params: Params) -> Self {
        RequestInput::Single(params.into())
    }
}

impl From<Vec<RequestSpec>> for RequestInput {
    fn from(specs: Vec<RequestSpec>) -> Self {
        RequestInput::Batch(specs)
    }
}

impl From<Vec<Params>> for RequestInput {
    fn from(batch: Vec<Params>) -> Self {
        RequestInput::Batch(batch.into_iter().map(RequestSpec::from).collect())
    }
}

/// Mirrors the shape of the [`RequestInput`] it answers.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutput {
    Single(ResponseEnvelope),
    Batch(Vec<ResponseEnvelope>),
}

impl RequestOutput {
    pub fn into_single(self) -> Option<ResponseEnvelope> {
        match self {
            RequestOutput::Single(env) => Some(env),
            RequestOutput::Batch(_) => None,
        }
    }

    pub fn into_batch(self) -> Vec<ResponseEnvelope> {
        match self {
            RequestOutput::Single(env) => vec![env],
            RequestOutput::Batch(envs) => envs,
        }
    }
}

/// Call-level switches for [`Client::execute`].
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    /// Run batches on the client's executor; `false` runs them one by one.
    pub concurrent: bool,
    /// Overrides the client's cache mode for this call.
    pub cache_mode: Option<CacheMode>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            concurrent: true,
            cache_mode: None,
        }
    }
}

/// HTTP API client: single requests and deduplicated batches over one
/// dispatch pipeline.
///
/// Cheap to clone; clones share the transport, cache and hooks.
#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    batch: Arc<BatchCoordinator>,
    cache_mode: CacheMode,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(dispatcher: Arc<Dispatcher>, batch: Arc<BatchCoordinator>) -> Self {
        Self {
            dispatcher,
            batch,
            cache_mode: CacheMode::Default,
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.dispatcher.config
    }

    /// Hook registry of this client; registrations apply to later calls.
    pub fn hooks(&self) -> &Arc<HookPipeline> {
        &self.dispatcher.hooks
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// A handle on the same client that uses `mode` for every call.
    pub fn with_cache_mode(&self, mode: CacheMode) -> Self {
        Self {
            cache_mode: mode,
            ..self.clone()
        }
    }

    /// A handle that neither reads nor writes the cache.
    pub fn cacheless(&self) -> Self {
        self.with_cache_mode(CacheMode::Bypass)
    }

    /// A handle that skips cache reads and overwrites entries on success.
    pub fn refresh(&self) -> Self {
        self.with_cache_mode(CacheMode::Refresh)
    }

    /// Run a single request.
    ///
    /// Failures come back as an envelope with `result == false`, unless
    /// `raise_on_error` is configured, in which case the error is returned.
    pub async fn request(&self, spec: impl Into<RequestSpec>) -> Result<ResponseEnvelope> {
        self.request_with(spec, self.cache_mode).await
    }

    pub async fn request_with(&self, spec: impl Into<RequestSpec>, mode: CacheMode) -> Result<ResponseEnvelope> {
        let opts = DispatchOptions {
            cache_mode: mode,
            ..Default::default()
        };
        let out = self.dispatcher.execute(spec.into(), opts).await;
        match out.error {
            Some(err) if self.dispatcher.config.raise_on_error => Err(err),
            _ => Ok(out.envelope),
        }
    }

    /// Run a batch concurrently; one envelope per input, in input order.
    pub async fn request_batch<I, S>(&self, specs: I) -> Vec<ResponseEnvelope>
    where
        I: IntoIterator<Item = S>,
        S: Into<RequestSpec>,
    {
        self.request_batch_with(specs, CallOptions::default()).await
    }

    /// Run a batch one request at a time.
    pub async fn request_batch_sequential<I, S>(&self, specs: I) -> Vec<ResponseEnvelope>
    where
        I: IntoIterator<Item = S>,
        S: Into<RequestSpec>,
    {
        self.request_batch_with(
            specs,
            CallOptions {
                concurrent: false,
                cache_mode: None,
            },
        )
        .await
    }

    pub async fn request_batch_with<I, S>(&self, specs: I, opts: CallOptions) -> Vec<ResponseEnvelope>
    where
        I: IntoIterator<Item = S>,
        S: Into<RequestSpec>,
    {
        let specs: Vec<RequestSpec> = specs.into_iter().map(Into::into).collect();
        let mode = opts.cache_mode.unwrap_or(self.cache_mode);
        if opts.concurrent {
            self.batch.execute_batch(specs, mode).await
        } else {
            self.batch.execute_with(specs, mode, &SequentialExecutor).await
        }
    }

    /// Single entry point accepting either a request or a batch.
    pub async fn execute(&self, input: impl Into<RequestInput>, opts: CallOptions) -> Result<RequestOutput> {
        let mode = opts.cache_mode.unwrap_or(self.cache_mode);
        match input.into() {
            RequestInput::Single(spec) => self.request_with(spec, mode).await.map(RequestOutput::Single),
            RequestInput::Batch(specs) => Ok(RequestOutput::Batch(
                self.request_batch_with(
                    specs,
                    CallOptions {
                        cache_mode: Some(mode),
                        ..opts
                    },
                )
                .await,
            )),
        }
    }

    /// Remove this client's cache entries, optionally only those under
    /// `prefix` within its namespace. Returns the number removed.
    pub async fn clear_cache(&self, prefix: Option<&str>) -> usize {
        self.dispatcher.cache.clear(prefix).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.dispatcher.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_conversions() {
        let params = json!({"post_id": 1}).as_object().cloned().unwrap();
        assert!(matches!(RequestInput::from(params.clone()), RequestInput::Single(_)));
        match RequestInput::from(vec![params.clone(), params]) {
            RequestInput::Batch(specs) => assert_eq!(specs.len(), 2),
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[test]
    fn test_output_views() {
        let env = ResponseEnvelope::success(200, crate::types::Payload::Empty);
        assert_eq!(RequestOutput::Single(env.clone()).into_batch(), vec![env.clone()]);
        assert!(RequestOutput::Batch(vec![env]).into_single().is_none());
    }

    #[test]
    fn test_mode_handles_share_state() {
        let client = Client::builder().base_url("https://api.test").build().unwrap();
        let bypass = client.cacheless();
        assert_eq!(bypass.cache_mode(), CacheMode::Bypass);
        assert_eq!(client.refresh().cache_mode(), CacheMode::Refresh);
        assert!(Arc::ptr_eq(client.hooks(), bypass.hooks()));
    }
}
