//! Concurrent fan-out hook.

use super::{
    begin_invocation, settle_invocation, BoxFuture, HookCore, HookInterceptor, TapError, TapMeta,
};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;

type UnitFn<C> = Arc<dyn Fn(C) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Concurrent dispatch: all handlers are started together and the dispatch
/// completes only when every handler has settled.
///
/// Handler failures are independent: a failing handler never prevents its
/// siblings from running to completion. The dispatch caller receives one
/// representative failure (the first in registration order among the
/// failures); the rest are discarded by the caller's policy.
pub struct ParallelHook<C> {
    core: HookCore<UnitFn<C>>,
}

impl<C: Clone + Send + 'static> ParallelHook<C> {
    /// Creates a hook with the given name.
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

    /// Installs an interceptor.
    pub fn intercept(&self, interceptor: Arc<dyn HookInterceptor>) {
        self.core.add_interceptor(interceptor);
    }

    /// Starts every handler, waits for all of them to settle, and returns
    /// the representative failure if any handler failed.
    pub async fn call(&self, ctx: C) -> Result<(), TapError> {
        let (taps, interceptors) = self.core.snapshot();
        let hook = self.core.name().to_string();

        let invocations = taps.into_iter().map(|tap| {
            let ctx = ctx.clone();
            let interceptors = interceptors.clone();
            let hook = hook.clone();
            async move {
                let meta = TapMeta::new(&hook, &tap.name);
                let observers = begin_invocation(&interceptors, &meta);
                match (tap.handler)(ctx).await {
                    Ok(()) => {
                        settle_invocation(observers, None);
                        None
                    }
                    Err(err) => {
                        settle_invocation(observers, Some(&err));
                        Some(TapError::new(&hook, &tap.name, err))
                    }
                }
            }
        });

        let mut failures: Vec<TapError> = join_all(invocations)
            .await
            .into_iter()
            .flatten()
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.remove(0))
        }
    }

    /// Returns the registration names in start order.
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
