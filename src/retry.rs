//! Retry policy with exponential backoff.
//!
//! Each attempt moves `Pending -> Sent -> {Success | RetryableFailure | FatalFailure}`;
//! a retryable failure goes back to `Pending` after the backoff delay. A
//! failure is retryable iff the retry budget is not spent and either its kind
//! is in `retryable_errors` or it is an HTTP error whose status is in
//! `retryable_status_codes`. Parse and validation failures never retry.

use crate::error::{Error, ErrorKind};
use crate::Result;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Lifecycle of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Sent,
    Success,
    RetryableFailure,
    FatalFailure,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub enabled: bool,
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub multiplier: f64,
    pub max_backoff: Option<Duration>,
    pub retryable_status_codes: BTreeSet<u16>,
    pub retryable_errors: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff: None,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            retryable_errors: [ErrorKind::Network, ErrorKind::Timeout].into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: f64) -> Self {
        self.backoff_base = base;
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    pub fn with_retryable_status_codes<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_retryable_errors<I: IntoIterator<Item = ErrorKind>>(mut self, kinds: I) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    pub fn is_retryable(&self, err: &Error) -> bool {
        match err.kind() {
            ErrorKind::Http => err
                .status_code()
                .map(|s| self.retryable_status_codes.contains(&s))
                .unwrap_or(false),
            kind @ (ErrorKind::Network | ErrorKind::Timeout) => self.retryable_errors.contains(&kind),
            _ => false,
        }
    }

    /// Classify a finished attempt.
    pub fn classify(&self, outcome: &Result<impl Sized>) -> AttemptState {
        match outcome {
            Ok(_) => AttemptState::Success,
            Err(e) if self.is_retryable(e) => AttemptState::RetryableFailure,
            Err(_) => AttemptState::FatalFailure,
        }
    }

    /// `retries_used` counts retries already performed (0 after the first failure).
    pub fn decide(&self, retries_used: u32, err: &Error) -> RetryDecision {
        if self.enabled && retries_used < self.max_retries && self.is_retryable(err) {
            RetryDecision::Retry {
                delay: self.delay_for_attempt(retries_used + 1),
            }
        } else {
            RetryDecision::Fail
        }
    }

    /// Backoff before retry number `attempt` (1-based):
    /// `backoff_base * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_base.as_secs_f64() * self.multiplier.powi(exp);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_backoff {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }

    /// Drive `op` until it succeeds, fails fatally or the budget is spent.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// on exhaustion.
    pub async fn run<T, F, Fut>(&self, request_id: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries_used = 0u32;
        loop {
            let attempt = retries_used + 1;
            let err = match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            match self.decide(retries_used, &err) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        request_id,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries_used += 1;
                }
                RetryDecision::Fail => return Err(err),
            }
        }
    }
}
