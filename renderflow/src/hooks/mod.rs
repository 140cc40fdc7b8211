//! Generic hook dispatch primitives.
//!
//! A hook is an ordered list of named handler registrations ("taps") with one
//! of five dispatch semantics:
//!
//! - [`SeriesHook`]: sequential, fire for side effects, first failure aborts.
//! - [`WaterfallHook`]: sequential, each handler's output feeds the next.
//! - [`BailHook`]: sequential, the first non-sentinel return wins.
//! - [`ParallelHook`]: all handlers started together, every handler settles.
//! - [`SyncHook`]: sequential and non-suspending, per-handler failure
//!   isolation.
//!
//! Hooks know nothing about pipeline stages; the payload type is generic and
//! registration order is always the dispatch (or start) order. Every hook
//! supports transparent [interception](intercept) for observability.

mod intercept;
mod parallel;
mod sequential;
mod sync;

pub use intercept::{HookInterceptor, InvocationObserver, NoOpObserver, TapMeta};
pub use parallel::ParallelHook;
pub use sequential::{BailHook, SeriesHook, WaterfallHook};
pub use sync::SyncHook;

use parking_lot::RwLock;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future type used for type-erased handler storage.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Failure of a single named handler during a dispatch.
///
/// Carries hook/tap attribution; the handler's own error is preserved in
/// `cause` and is not altered by interception.
#[derive(Debug, Error)]
#[error("handler '{tap}' in hook '{hook}' failed: {cause}")]
pub struct TapError {
    /// The hook being dispatched.
    pub hook: String,
    /// The registration name of the failing handler.
    pub tap: String,
    /// The handler's error.
    pub cause: anyhow::Error,
}

impl TapError {
    pub(crate) fn new(hook: &str, tap: &str, cause: anyhow::Error) -> Self {
        Self {
            hook: hook.to_string(),
            tap: tap.to_string(),
            cause,
        }
    }
}

/// A named handler registration.
pub(crate) struct Tap<F> {
    pub(crate) name: String,
    pub(crate) handler: F,
}

impl<F: Clone> Clone for Tap<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// Shared registration + interceptor bookkeeping for all hook kinds.
pub(crate) struct HookCore<F> {
    name: String,
    taps: RwLock<Vec<Tap<F>>>,
    interceptors: RwLock<Vec<Arc<dyn HookInterceptor>>>,
}

impl<F: Clone> HookCore<F> {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            taps: RwLock::new(Vec::new()),
            interceptors: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn add_tap(&self, name: String, handler: F) {
        let meta = TapMeta::new(&self.name, &name);
        for interceptor in self.interceptors.read().iter() {
            interceptor.on_register(&meta);
        }
        self.taps.write().push(Tap { name, handler });
    }

    pub(crate) fn add_interceptor(&self, interceptor: Arc<dyn HookInterceptor>) {
        // Replay registrations already present so late-installed interceptors
        // see the full tap set.
        for tap in self.taps.read().iter() {
            interceptor.on_register(&TapMeta::new(&self.name, &tap.name));
        }
        self.interceptors.write().push(interceptor);
    }

    /// Snapshot of taps taken at dispatch start; registrations made while a
    /// dispatch is in flight are not observed by it.
    pub(crate) fn snapshot(&self) -> (Vec<Tap<F>>, Vec<Arc<dyn HookInterceptor>>) {
        (self.taps.read().clone(), self.interceptors.read().clone())
    }

    pub(crate) fn tap_names(&self) -> Vec<String> {
        self.taps.read().iter().map(|t| t.name.clone()).collect()
    }

    pub(crate) fn tap_count(&self) -> usize {
        self.taps.read().len()
    }
}

/// Notifies all interceptors that an invocation of `meta` is starting.
pub(crate) fn begin_invocation(
    interceptors: &[Arc<dyn HookInterceptor>],
    meta: &TapMeta,
) -> Vec<Box<dyn InvocationObserver>> {
    interceptors.iter().map(|i| i.on_invoke(meta)).collect()
}

/// Notifies the observers collected at invocation start that the handler
/// settled.
pub(crate) fn settle_invocation(
    observers: Vec<Box<dyn InvocationObserver>>,
    error: Option<&anyhow::Error>,
) {
    for observer in observers {
        match error {
            None => observer.on_success(),
            Some(err) => observer.on_error(err),
        }
    }
}
