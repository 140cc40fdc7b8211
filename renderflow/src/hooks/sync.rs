//! Non-suspending hook with per-handler failure isolation.

use super::{begin_invocation, settle_invocation, HookCore, HookInterceptor, TapError, TapMeta};
use std::sync::Arc;

type SyncFn<C> = Arc<dyn Fn(C) -> anyhow::Result<()> + Send + Sync>;

/// Sequential, non-suspending dispatch.
///
/// Unlike [`SeriesHook`](super::SeriesHook), a handler failure does not stop
/// the remaining handlers: every handler runs, and all failures are returned
/// to the caller for it to log or discard. This is the teardown hook shape,
/// where one broken cleanup must never block the rest.
pub struct SyncHook<C> {
    core: HookCore<SyncFn<C>>,
}

impl<C: Clone> SyncHook<C> {
    /// Creates a hook with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: HookCore::new(name),
        }
    }

    /// Registers a named synchronous handler.
    pub fn tap<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let f: SyncFn<C> = Arc::new(handler);
        self.core.add_tap(name.into(), f);
    }

    /// Installs an interceptor.
    pub fn intercept(&self, interceptor: Arc<dyn HookInterceptor>) {
        self.core.add_interceptor(interceptor);
    }

    /// Dispatches every handler in registration order, collecting failures
    /// instead of propagating them.
    pub fn call(&self, ctx: C) -> Vec<TapError> {
        let (taps, interceptors) = self.core.snapshot();
        let mut failures = Vec::new();
        for tap in taps {
            let meta = TapMeta::new(self.core.name(), &tap.name);
            let observers = begin_invocation(&interceptors, &meta);
            match (tap.handler)(ctx.clone()) {
                Ok(()) => settle_invocation(observers, None),
                Err(err) => {
                    settle_invocation(observers, Some(&err));
                    failures.push(TapError::new(self.core.name(), &tap.name, err));
                }
            }
        }
        failures
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn failures_are_isolated() {
        let hook: SyncHook<Arc<AtomicUsize>> = SyncHook::new("dispose");
        hook.tap("first", |count: Arc<AtomicUsize>| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        hook.tap("broken", |_| anyhow::bail!("cleanup failed"));
        hook.tap("last", |count: Arc<AtomicUsize>| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let count = Arc::new(AtomicUsize::new(0));
        let failures = hook.call(Arc::clone(&count));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].tap, "broken");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_failures_on_clean_run() {
        let hook: SyncHook<u32> = SyncHook::new("dispose");
        hook.tap("ok", |_| Ok(()));
        assert!(hook.call(1).is_empty());
    }
}
