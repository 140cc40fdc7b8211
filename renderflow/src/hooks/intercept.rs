//! Hook interception traits.
//!
//! An interceptor observes a hook from the outside: it is told when handlers
//! are registered and when each invocation begins and settles. Interceptors
//! must be transparent: they cannot change dispatch order, short-circuit
//! behavior, or the identity of errors flowing to the dispatch caller.

/// Identity of a single handler registration on a named hook.
///
/// Used for attribution in logs and instrumentation records only; dispatch
/// semantics never depend on names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapMeta {
    /// The hook the handler is registered on (e.g. `"initEngine"`).
    pub hook: String,
    /// The registration name, conventionally the plugin name.
    pub tap: String,
}

impl TapMeta {
    pub(crate) fn new(hook: &str, tap: &str) -> Self {
        Self {
            hook: hook.to_string(),
            tap: tap.to_string(),
        }
    }
}

/// Observer for one in-flight handler invocation.
///
/// Exactly one of [`on_success`](Self::on_success) or
/// [`on_error`](Self::on_error) is called, after the handler settles.
pub trait InvocationObserver: Send {
    /// The handler returned successfully.
    fn on_success(self: Box<Self>);

    /// The handler failed. The error continues to propagate unchanged.
    fn on_error(self: Box<Self>, error: &anyhow::Error);
}

/// Registration-time wrapper installed on a hook via
/// [`intercept`](crate::hooks::SeriesHook::intercept).
///
/// `on_register` fires for every handler registered after installation and is
/// replayed for handlers already present at install time. `on_invoke` fires
/// once per handler invocation; the returned observer is notified when that
/// invocation settles.
pub trait HookInterceptor: Send + Sync {
    /// A handler was registered on the intercepted hook.
    fn on_register(&self, _meta: &TapMeta) {}

    /// An invocation of the handler identified by `meta` is starting.
    fn on_invoke(&self, meta: &TapMeta) -> Box<dyn InvocationObserver>;
}

/// Observer that does nothing. Useful for interceptors that only care about
/// registration events.
#[derive(Debug, Default)]
pub struct NoOpObserver;

impl InvocationObserver for NoOpObserver {
    fn on_success(self: Box<Self>) {}

    fn on_error(self: Box<Self>, _error: &anyhow::Error) {}
}
