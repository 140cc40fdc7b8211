//! Sequential hook kinds: series, waterfall, and bail.

use super::{
    begin_invocation, settle_invocation, BoxFuture, HookCore, HookInterceptor, TapError, TapMeta,
};
use std::future::Future;
use std::sync::Arc;

type UnitFn<C> = Arc<dyn Fn(C) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;
type WaterfallFn<C> = Arc<dyn Fn(C) -> BoxFuture<anyhow::Result<C>> + Send + Sync>;
type BailFn<C, R> = Arc<dyn Fn(C) -> BoxFuture<anyhow::Result<Option<R>>> + Send + Sync>;

/// Sequential dispatch for side effects.
///
/// Handlers run one at a time in registration order. The first failure aborts
/// the remaining chain and propagates to the dispatch caller.
pub struct SeriesHook<C> {
    core: HookCore<UnitFn<C>>,
}

impl<C: Clone + Send + 'static> SeriesHook<C> {
    /// Creates a hook with the given name (used for attribution only).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: HookCore::new(name),
        }
    }

    /// Registers a named async handler.
    pub fn tap<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let f: UnitFn<C> = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.core.add_tap(name.into(), f);
    }

    /// Installs an interceptor (see [`HookInterceptor`]).
    pub fn intercept(&self, interceptor: Arc<dyn HookInterceptor>) {
        self.core.add_interceptor(interceptor);
    }

    /// Dispatches all handlers sequentially.
    pub async fn call(&self, ctx: C) -> Result<(), TapError> {
        let (taps, interceptors) = self.core.snapshot();
        for tap in taps {
            let meta = TapMeta::new(self.core.name(), &tap.name);
            let observers = begin_invocation(&interceptors, &meta);
            match (tap.handler)(ctx.clone()).await {
                Ok(()) => settle_invocation(observers, None),
                Err(err) => {
                    settle_invocation(observers, Some(&err));
                    return Err(TapError::new(self.core.name(), &tap.name, err));
                }
            }
        }
        Ok(())
    }

    /// Returns the registration names in dispatch order.
    #[must_use]
    pub fn tap_names(&self) -> Vec<String> {
        self.core.tap_names()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.tap_count()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.tap_count() == 0
    }
}

/// Sequential transforming dispatch.
///
/// Each handler's returned value becomes the next handler's input; the final
/// value is the dispatch result. The first failure aborts the chain.
pub struct WaterfallHook<C> {
    core: HookCore<WaterfallFn<C>>,
}

impl<C: Clone + Send + 'static> WaterfallHook<C> {
    /// Creates a hook with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: HookCore::new(name),
        }
    }

    /// Registers a named async transforming handler.
    pub fn tap<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<C>> + Send + 'static,
    {
        let f: WaterfallFn<C> = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.core.add_tap(name.into(), f);
    }

    /// Installs an interceptor.
    pub fn intercept(&self, interceptor: Arc<dyn HookInterceptor>) {
        self.core.add_interceptor(interceptor);
    }

    /// Dispatches all handlers sequentially, threading the payload through.
    pub async fn call(&self, ctx: C) -> Result<C, TapError> {
        let (taps, interceptors) = self.core.snapshot();
        let mut current = ctx;
        for tap in taps {
            let meta = TapMeta::new(self.core.name(), &tap.name);
            let observers = begin_invocation(&interceptors, &meta);
            match (tap.handler)(current).await {
                Ok(next) => {
                    settle_invocation(observers, None);
                    current = next;
                }
                Err(err) => {
                    settle_invocation(observers, Some(&err));
                    return Err(TapError::new(self.core.name(), &tap.name, err));
                }
            }
        }
        Ok(current)
    }

    /// Returns the registration names in dispatch order.
    #[must_use]
    pub fn tap_names(&self) -> Vec<String> {
        self.core.tap_names()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.tap_count()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.tap_count() == 0
    }
}

/// Sequential short-circuiting dispatch.
///
/// `None` is the continue sentinel: handlers returning it pass control to the
/// next handler. The first handler returning `Some(value)` stops the chain
/// and that value becomes the dispatch result. A fully-sentinel chain yields
/// `None`.
pub struct BailHook<C, R> {
    core: HookCore<BailFn<C, R>>,
}

impl<C, R> BailHook<C, R>
where
    C: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Creates a hook with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: HookCore::new(name),
        }
    }

    /// Registers a named async handler that may bail with a result.
    pub fn tap<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<R>>> + Send + 'static,
    {
        let f: BailFn<C, R> = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.core.add_tap(name.into(), f);
    }

    /// Installs an interceptor.
    pub fn intercept(&self, interceptor: Arc<dyn HookInterceptor>) {
        self.core.add_interceptor(interceptor);
    }

    /// Dispatches handlers until one bails or the chain is exhausted.
    pub async fn call(&self, ctx: C) -> Result<Option<R>, TapError> {
        let (taps, interceptors) = self.core.snapshot();
        for tap in taps {
            let meta = TapMeta::new(self.core.name(), &tap.name);
            let observers = begin_invocation(&interceptors, &meta);
            match (tap.handler)(ctx.clone()).await {
                Ok(None) => settle_invocation(observers, None),
                Ok(Some(result)) => {
                    settle_invocation(observers, None);
                    return Ok(Some(result));
                }
                Err(err) => {
                    settle_invocation(observers, Some(&err));
                    return Err(TapError::new(self.core.name(), &tap.name, err));
                }
            }
        }
        Ok(None)
    }

    /// Returns the registration names in dispatch order.
    #[must_use]
    pub fn tap_names(&self) -> Vec<String> {
        self.core.tap_names()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.tap_count()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.tap_count() == 0
    }
}
