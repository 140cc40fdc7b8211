//! Cooperative cancellation for a pipeline run.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation channel created with a run-context and living for its
/// lifetime.
///
/// The flag is monotonic: once set it never reverts. Cancellation is
/// cooperative: it prevents subsequent stages from starting and tells the
/// frame driver to stop ticking, but never interrupts an in-flight dispatch.
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    callbacks: Mutex<Vec<Box<dyn FnOnce(&str) + Send>>>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .field("reason", &self.reason.lock())
            .finish()
    }
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Requests cancellation.
    ///
    /// Idempotent: only the first reason is stored, and callbacks run once.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();

        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.reason.lock() = Some(reason.clone());

            let callbacks: Vec<_> = {
                let mut lock = self.callbacks.lock();
                std::mem::take(&mut *lock)
            };
            for callback in callbacks {
                callback(&reason);
            }
        }
    }

    /// Registers a callback to run when cancellation is requested.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_default();
            callback(&reason);
        } else {
            self.callbacks.lock().push(Box::new(callback));
        }
    }
}
