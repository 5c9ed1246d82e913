//! Request lifecycle hooks.
//!
//! Three phases run in registration order around every dispatch:
//! `before_request` may rewrite params and abort the dispatch by failing;
//! `after_request` and `on_request_error` observe the outcome and cannot
//! change it. Hooks belong to the client instance that registers them.

use crate::types::{Method, Params, ResponseEnvelope};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeRequest,
    AfterRequest,
    OnRequestError,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::BeforeRequest => "before_request",
            HookPhase::AfterRequest => "after_request",
            HookPhase::OnRequestError => "on_request_error",
        }
    }
}

/// What a hook gets to know about the dispatch it runs in.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    pub request_id: String,
    /// Identity of the client the hook is registered on
    pub client: String,
    pub method: Method,
    /// Endpoint template (placeholders unresolved)
    pub endpoint: String,
    pub batch_index: Option<usize>,
}

#[async_trait]
pub trait BeforeRequestHook: Send + Sync {
    async fn before_request(&self, ctx: &HookContext, params: &mut Params) -> Result<()>;
}

#[async_trait]
pub trait AfterRequestHook: Send + Sync {
    async fn after_request(&self, ctx: &HookContext, envelope: &ResponseEnvelope) -> Result<()>;
}

#[async_trait]
pub trait OnRequestErrorHook: Send + Sync {
    async fn on_request_error(&self, ctx: &HookContext, error: &Error) -> Result<()>;
}

pub struct FnBeforeHook<F>(F);

#[async_trait]
impl<F> BeforeRequestHook for FnBeforeHook<F>
where
    F: Fn(&HookContext, &mut Params) -> Result<()> + Send + Sync,
{
    async fn before_request(&self, ctx: &HookContext, params: &mut Params) -> Result<()> {
        (self.0)(ctx, params)
    }
}

pub struct FnAfterHook<F>(F);

#[async_trait]
impl<F> AfterRequestHook for FnAfterHook<F>
where
    F: Fn(&HookContext, &ResponseEnvelope) -> Result<()> + Send + Sync,
{
    async fn after_request(&self, ctx: &HookContext, envelope: &ResponseEnvelope) -> Result<()> {
        (self.0)(ctx, envelope)
    }
}

pub struct FnErrorHook<F>(F);

#[async_trait]
impl<F> OnRequestErrorHook for FnErrorHook<F>
where
    F: Fn(&HookContext, &Error) -> Result<()> + Send + Sync,
{
    async fn on_request_error(&self, ctx: &HookContext, error: &Error) -> Result<()> {
        (self.0)(ctx, error)
    }
}

#[derive(Clone)]
pub enum HookCallback {
    Before(Arc<dyn BeforeRequestHook>),
    After(Arc<dyn AfterRequestHook>),
    OnError(Arc<dyn OnRequestErrorHook>),
}

impl HookCallback {
    pub fn phase(&self) -> HookPhase {
        match self {
            HookCallback::Before(_) => HookPhase::BeforeRequest,
            HookCallback::After(_) => HookPhase::AfterRequest,
            HookCallback::OnError(_) => HookPhase::OnRequestError,
        }
    }
}

#[derive(Clone)]
pub struct HookRegistration {
    pub name: String,
    pub callback: HookCallback,
}

impl HookRegistration {
    pub fn before<H: BeforeRequestHook + 'static>(name: impl Into<String>, hook: H) -> Self {
        Self {
            name: name.into(),
            callback: HookCallback::Before(Arc::new(hook)),
        }
    }

    pub fn after<H: AfterRequestHook + 'static>(name: impl Into<String>, hook: H) -> Self {
        Self {
            name: name.into(),
            callback: HookCallback::After(Arc::new(hook)),
        }
    }

    pub fn on_error<H: OnRequestErrorHook + 'static>(name: impl Into<String>, hook: H) -> Self {
        Self {
            name: name.into(),
            callback: HookCallback::OnError(Arc::new(hook)),
        }
    }

    pub fn phase(&self) -> HookPhase {
        self.callback.phase()
    }
}

/// Ordered hook lists, one per phase.
#[derive(Default)]
pub struct HookPipeline {
    hooks: RwLock<HashMap<HookPhase, Vec<HookRegistration>>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<HookPhase, Vec<HookRegistration>>> {
        self.hooks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<HookPhase, Vec<HookRegistration>>> {
        self.hooks.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, registration: HookRegistration) {
        debug!(phase = registration.phase().as_str(), hook = %registration.name, "hook registered");
        self.write()
            .entry(registration.phase())
            .or_default()
            .push(registration);
    }

    pub fn register_before<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&HookContext, &mut Params) -> Result<()> + Send + Sync + 'static,
    {
        self.register(HookRegistration::before(name, FnBeforeHook(func)));
    }

    pub fn register_after<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&HookContext, &ResponseEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.register(HookRegistration::after(name, FnAfterHook(func)));
    }

    pub fn register_on_error<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&HookContext, &Error) -> Result<()> + Send + Sync + 'static,
    {
        self.register(HookRegistration::on_error(name, FnErrorHook(func)));
    }

    /// Remove every hook called `name` from `phase`.
    pub fn unregister(&self, phase: HookPhase, name: &str) -> bool {
        let mut hooks = self.write();
        if let Some(entry) = hooks.get_mut(&phase) {
            let len = entry.len();
            entry.retain(|h| h.name != name);
            return entry.len() < len;
        }
        false
    }

    pub fn count(&self, phase: HookPhase) -> usize {
        self.read().get(&phase).map(|v| v.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn snapshot(&self, phase: HookPhase) -> Vec<HookRegistration> {
        self.read().get(&phase).cloned().unwrap_or_default()
    }

    /// Run before-request hooks. The first failure aborts the dispatch.
    pub async fn run_before(&self, ctx: &HookContext, params: &mut Params) -> Result<()> {
        for reg in self.snapshot(HookPhase::BeforeRequest) {
            if let HookCallback::Before(ref hook) = reg.callback {
                hook.before_request(ctx, params).await.map_err(|e| match e {
                    Error::Hook { .. } => e,
                    other => Error::hook(reg.name.clone(), other.to_string()),
                })?;
            }
        }
        Ok(())
    }

    /// Run after-request hooks. Failures are logged only.
    pub async fn run_after(&self, ctx: &HookContext, envelope: &ResponseEnvelope) {
        for reg in self.snapshot(HookPhase::AfterRequest) {
            if let HookCallback::After(ref hook) = reg.callback {
                if let Err(e) = hook.after_request(ctx, envelope).await {
                    warn!(request_id = %ctx.request_id, hook = %reg.name, error = %e, "after_request hook failed");
                }
            }
        }
    }

    /// Run on-error hooks. Failures are logged only.
    pub async fn run_on_error(&self, ctx: &HookContext, error: &Error) {
        for reg in self.snapshot(HookPhase::OnRequestError) {
            if let HookCallback::OnError(ref hook) = reg.callback {
                if let Err(e) = hook.on_request_error(ctx, error).await {
                    warn!(request_id = %ctx.request_id, hook = %reg.name, error = %e, "on_request_error hook failed");
                }
            }
        }
    }
}
