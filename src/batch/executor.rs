//! Batch executors.

use crate::types::ResponseEnvelope;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::warn;

/// One unit of work: a full dispatch producing an envelope.
pub type Job = BoxFuture<'static, ResponseEnvelope>;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(ResponseEnvelope),
    /// The job did not finish before the wait timeout.
    TimedOut,
    /// The job panicked or was lost.
    Failed(String),
}

/// Runs a set of jobs and reports one outcome per job, index-aligned.
#[async_trait]
pub trait AsyncExecutor: Send + Sync {
    async fn execute(&self, jobs: Vec<Job>) -> Vec<JobOutcome>;

    fn name(&self) -> &'static str;
}

/// Spawns jobs on the tokio runtime with a hard in-flight ceiling.
///
/// With a wait timeout, jobs still running at the deadline are reported as
/// [`JobOutcome::TimedOut`] and, if `cancel_on_timeout` is set, aborted.
#[derive(Debug, Clone)]
pub struct TaskPoolExecutor {
    max_workers: usize,
    wait_timeout: Option<Duration>,
    cancel_on_timeout: bool,
}

impl TaskPoolExecutor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            wait_timeout: None,
            cancel_on_timeout: true,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_cancel_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_timeout = cancel;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

impl Default for TaskPoolExecutor {
    fn default() -> Self {
        Self::new(crate::client::DEFAULT_MAX_WORKERS)
    }
}

#[async_trait]
impl AsyncExecutor for TaskPoolExecutor {
    async fn execute(&self, jobs: Vec<Job>) -> Vec<JobOutcome> {
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let permits = permits.clone();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    job.await
                })
            })
            .collect();

        let deadline = self.wait_timeout.map(|t| Instant::now() + t);
        let mut outcomes = Vec::with_capacity(handles.len());
        for (index, mut handle) in handles.into_iter().enumerate() {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        if self.cancel_on_timeout {
                            handle.abort();
                        }
                        warn!(job = index, "batch job did not finish before the wait timeout");
                        outcomes.push(JobOutcome::TimedOut);
                        continue;
                    }
                },
                None => handle.await,
            };
            outcomes.push(match joined {
                Ok(env) => JobOutcome::Completed(env),
                Err(e) if e.is_panic() => {
                    let msg = panic_message(e.into_panic());
                    warn!(job = index, panic = %msg, "batch job panicked");
                    JobOutcome::Failed(format!("worker panicked: {}", msg))
                }
                Err(e) => JobOutcome::Failed(format!("worker task lost: {}", e)),
            });
        }
        outcomes
    }

    fn name(&self) -> &'static str {
        "task_pool"
    }
}

/// Runs jobs one after another on the calling task, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

#[async_trait]
impl AsyncExecutor for SequentialExecutor {
    async fn execute(&self, jobs: Vec<Job>) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            outcomes.push(match AssertUnwindSafe(job).catch_unwind().await {
                Ok(env) => JobOutcome::Completed(env),
                Err(panic) => JobOutcome::Failed(format!("worker panicked: {}", panic_message(panic))),
            });
        }
        outcomes
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
