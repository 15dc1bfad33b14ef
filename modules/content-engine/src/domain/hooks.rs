//! Ordered before/after resolve hooks and post-list observers.
//!
//! Registration order is the execution order. [`Hooks`] is append-only and
//! is frozen into a [`HookPipeline`] when the engine is built.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use contentkit_schema::{Action, Record};

use crate::domain::context::{ActionOutput, RequestContext};
use crate::domain::error::EngineError;

/// Error raised by a hook. Returned to the caller unchanged inside
/// [`EngineError::HookAborted`] / [`EngineError::PostActionHookFailed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Middleware around every resolved action. Both stages default to no-ops.
#[async_trait]
pub trait ResolveHook: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs before the permission check. May rewrite the context.
    async fn before(&self, _ctx: &mut RequestContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after a successful action. May transform the output.
    async fn after(
        &self,
        _ctx: &mut RequestContext,
        _output: &mut ActionOutput,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Observes successful list results. Errors are logged, never returned.
#[async_trait]
pub trait ListObserver: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_list(&self, ctx: &RequestContext, records: &mut Vec<Record>)
    -> Result<(), HookError>;
}

/// Append-only hook registration.
#[derive(Clone, Default)]
pub struct Hooks {
    before: Vec<Arc<dyn ResolveHook>>,
    after: Vec<Arc<dyn ResolveHook>>,
    list: Vec<Arc<dyn ListObserver>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |hooks: &[Arc<dyn ResolveHook>]| -> Vec<String> {
            hooks.iter().map(|h| h.name().to_owned()).collect()
        };
        f.debug_struct("Hooks")
            .field("before", &names(&self.before))
            .field("after", &names(&self.after))
            .field("list", &self.list.len())
            .finish()
    }
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_resolve(&mut self, hook: Arc<dyn ResolveHook>) -> &mut Self {
        self.before.push(hook);
        self
    }

    pub fn on_after_resolve(&mut self, hook: Arc<dyn ResolveHook>) -> &mut Self {
        self.after.push(hook);
        self
    }

    /// Register one hook for both stages.
    pub fn on_resolve(&mut self, hook: Arc<dyn ResolveHook>) -> &mut Self {
        self.before.push(Arc::clone(&hook));
        self.after.push(hook);
        self
    }

    pub fn on_content_list(&mut self, observer: Arc<dyn ListObserver>) -> &mut Self {
        self.list.push(observer);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.before.len() + self.after.len() + self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The boxed action a pipeline wraps.
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<ActionOutput, EngineError>> + Send + 'a>>;

/// Frozen hooks, executed strictly sequentially per request.
#[derive(Clone, Debug, Default)]
pub struct HookPipeline {
    hooks: Hooks,
}

/// [`HookError`] message for a request cancelled after its action committed.
pub const CANCELLED_AFTER_COMMIT: &str = "request cancelled after the action committed";

fn ensure_live(ctx: &RequestContext) -> Result<(), EngineError> {
    if ctx.is_cancelled() {
        tracing::debug!("Request cancelled between pipeline stages");
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

impl HookPipeline {
    #[must_use]
    pub fn new(hooks: Hooks) -> Self {
        Self { hooks }
    }

    /// Run before-hooks, the action, after-hooks and (for list actions)
    /// post-list observers.
    ///
    /// # Errors
    ///
    /// - [`EngineError::HookAborted`] with the first before-hook error; the
    ///   action and remaining hooks are skipped
    /// - whatever the action returns
    /// - [`EngineError::PostActionHookFailed`] with the first after-hook error,
    ///   or with [`CANCELLED_AFTER_COMMIT`] when the context is cancelled
    ///   once the action has committed
    /// - [`EngineError::Cancelled`] if the context is cancelled before the
    ///   action runs
    pub async fn run<F>(&self, ctx: &mut RequestContext, action: F) -> Result<ActionOutput, EngineError>
    where
        F: for<'a> FnOnce(&'a RequestContext) -> ActionFuture<'a>,
    {
        for hook in &self.hooks.before {
            ensure_live(ctx)?;
            if let Err(e) = hook.before(ctx).await {
                tracing::debug!(hook = hook.name(), error = %e, "Before-resolve hook aborted request");
                return Err(EngineError::HookAborted(e));
            }
        }

        ensure_live(ctx)?;
        let mut output = action(&*ctx).await?;

        for hook in &self.hooks.after {
            if ctx.is_cancelled() {
                tracing::warn!(
                    hook = hook.name(),
                    resource = ctx.resource(),
                    action = %ctx.action(),
                    "Request cancelled after the action committed, remaining after-resolve hooks skipped"
                );
                return Err(EngineError::PostActionHookFailed(HookError::new(
                    CANCELLED_AFTER_COMMIT,
                )));
            }
            if let Err(e) = hook.after(ctx, &mut output).await {
                tracing::error!(
                    hook = hook.name(),
                    resource = ctx.resource(),
                    action = %ctx.action(),
                    error = %e,
                    "After-resolve hook failed after the action committed"
                );
                return Err(EngineError::PostActionHookFailed(e));
            }
        }

        if ctx.action() == Action::List
            && let ActionOutput::Records(records) = &mut output
        {
            for observer in &self.hooks.list {
                if let Err(e) = observer.on_list(ctx, records).await {
                    tracing::warn!(observer = observer.name(), error = %e, "Post-list observer failed");
                }
            }
        }

        Ok(output)
    }
}
