//! Ordered, deduplicated batch execution.

use super::executor::{AsyncExecutor, Job, JobOutcome};
use crate::cache::CacheKey;
use crate::client::{DispatchOptions, Dispatcher};
use crate::types::{CacheMode, RequestSpec, ResponseEnvelope};
use crate::Error;
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Batch indices sharing one cache key; executed at most once.
#[derive(Debug)]
struct DedupGroup {
    key: Option<CacheKey>,
    indices: Vec<usize>,
}

/// Fans a batch out over an [`AsyncExecutor`] and reassembles the envelopes
/// in input order.
pub struct BatchCoordinator {
    dispatcher: Arc<Dispatcher>,
    executor: Arc<dyn AsyncExecutor>,
    deduplicate: bool,
}

impl BatchCoordinator {
    pub fn new(dispatcher: Arc<Dispatcher>, executor: Arc<dyn AsyncExecutor>) -> Self {
        let deduplicate = dispatcher.config.deduplicate;
        Self {
            dispatcher,
            executor,
            deduplicate,
        }
    }

    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub async fn execute_batch(&self, specs: Vec<RequestSpec>, mode: CacheMode) -> Vec<ResponseEnvelope> {
        self.execute_with(specs, mode, self.executor.as_ref()).await
    }

    /// Run `specs` on `executor` instead of the coordinator's own.
    ///
    /// The result has one envelope per input, at the input's position.
    pub async fn execute_with(
        &self,
        specs: Vec<RequestSpec>,
        mode: CacheMode,
        executor: &dyn AsyncExecutor,
    ) -> Vec<ResponseEnvelope> {
        if specs.is_empty() {
            warn!("empty batch submitted");
            return Vec::new();
        }
        let total = specs.len();
        let groups = self.group(&specs);
        let mut slots: Vec<Option<ResponseEnvelope>> = vec![None; total];

        let cache = self.dispatcher.cache();
        let check_cache = mode.reads() && cache.is_enabled();
        let mut misses = Vec::with_capacity(groups.len());
        if check_cache {
            let lookups = groups.iter().map(|g| async move {
                match g.key {
                    Some(ref key) => cache.get(key).await,
                    None => None,
                }
            });
            let found = join_all(lookups).await;
            for (group, hit) in groups.into_iter().zip(found) {
                match hit {
                    Some(env) => {
                        for &i in &group.indices {
                            slots[i] = Some(env.clone());
                        }
                    }
                    None => misses.push(group),
                }
            }
        } else {
            misses = groups;
        }
        let hits = total - misses.iter().map(|g| g.indices.len()).sum::<usize>();

        info!(
            batch_size = total,
            dispatches = misses.len(),
            cache_hits = hits,
            executor = executor.name(),
            "dispatching batch"
        );

        let mut specs: Vec<Option<RequestSpec>> = specs.into_iter().map(Some).collect();
        let jobs: Vec<Job> = misses
            .iter()
            .map(|group| {
                let first = group.indices[0];
                let spec = specs[first].take().unwrap_or_default();
                let opts = DispatchOptions {
                    request_id: None,
                    cache_mode: mode,
                    cache_key: group.key.clone(),
                    cache_checked: check_cache && group.key.is_some(),
                    batch_index: Some(first),
                };
                let dispatcher = self.dispatcher.clone();
                async move { dispatcher.execute(spec, opts).await.envelope }.boxed()
            })
            .collect();

        let outcomes = executor.execute(jobs).await;
        for (group, outcome) in misses.iter().zip(outcomes) {
            let envelope = match outcome {
                JobOutcome::Completed(env) => env,
                JobOutcome::TimedOut => {
                    ResponseEnvelope::from_error(&Error::timeout("batch wait timeout exceeded"))
                }
                JobOutcome::Failed(msg) => ResponseEnvelope::from_error(&Error::executor(msg)),
            };
            if group.indices.len() > 1 {
                debug!(indices = ?group.indices, "replicating deduplicated result");
            }
            for &i in &group.indices {
                slots[i] = Some(envelope.clone());
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ResponseEnvelope::from_error(&Error::executor("executor returned no outcome"))
                })
            })
            .collect()
    }

    /// Bucket indices by cache key. Items without a key stay on their own.
    fn group(&self, specs: &[RequestSpec]) -> Vec<DedupGroup> {
        let mut groups: Vec<DedupGroup> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        for (index, spec) in specs.iter().enumerate() {
            let key = match self.dispatcher.cache_key(spec) {
                Ok(key) => key,
                Err(e) => {
                    debug!(index, error = %e, "no cache key, dispatching alone");
                    None
                }
            };
            match key {
                Some(key) if self.deduplicate => match by_key.get(key.as_str()) {
                    Some(&g) => groups[g].indices.push(index),
                    None => {
                        by_key.insert(key.as_str().to_string(), groups.len());
                        groups.push(DedupGroup {
                            key: Some(key),
                            indices: vec![index],
                        });
                    }
                },
                key => groups.push(DedupGroup {
                    key,
                    indices: vec![index],
                }),
            }
        }
        groups
    }
}
