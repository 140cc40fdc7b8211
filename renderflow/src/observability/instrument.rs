//! Timing interceptor and log sinks.
//!
//! [`instrument_pipeline`] installs a [`TimingInterceptor`] on every stage
//! hook. The interceptor is purely observational: it records when each
//! handler invocation starts and settles and emits one [`HookRecord`] per
//! invocation to a [`LogSink`]. Dispatch order, short-circuit behavior, and
//! error identity are untouched.

use crate::hooks::{HookInterceptor, InvocationObserver, TapMeta};
use crate::pipeline::Pipeline;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Whether the invocation settled successfully or with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// The handler returned successfully.
    Hook,
    /// The handler failed; `error` carries the message.
    Error,
}

/// One structured record per handler invocation.
///
/// Serializes with the wire field names devtools consumers expect:
/// `type`, `hook`, `plugin`, `start`, `end`, `duration`, `error?`.
#[derive(Debug, Clone, Serialize)]
pub struct HookRecord {
    /// Success or error.
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// The hook the handler was registered on.
    pub hook: String,
    /// The handler's registration (plugin) name.
    pub plugin: String,
    /// Invocation start, epoch milliseconds.
    #[serde(rename = "start")]
    pub start_ms: f64,
    /// Invocation end, epoch milliseconds.
    #[serde(rename = "end")]
    pub end_ms: f64,
    /// Elapsed time in milliseconds (monotonic clock).
    #[serde(rename = "duration")]
    pub duration_ms: f64,
    /// The error message, for error records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookRecord {
    /// Returns true for error records.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.record_type, RecordType::Error)
    }
}

/// Destination for instrumentation records.
pub trait LogSink: Send + Sync {
    /// Accepts one record. Must not fail; sinks swallow their own errors.
    fn record(&self, record: HookRecord);
}

/// Sink that logs records through the tracing framework.
///
/// Success records go to `info`, error records to `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, record: HookRecord) {
        if record.is_error() {
            warn!(
                hook = %record.hook,
                plugin = %record.plugin,
                duration_ms = record.duration_ms,
                error = record.error.as_deref().unwrap_or(""),
                "hook handler failed"
            );
        } else {
            info!(
                hook = %record.hook,
                plugin = %record.plugin,
                duration_ms = record.duration_ms,
                "hook handler completed"
            );
        }
    }
}

/// In-memory sink retaining every record, for tests and devtools surfaces.
#[derive(Debug, Default)]
pub struct CollectingLogSink {
    records: RwLock<Vec<HookRecord>>,
}

impl CollectingLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all records collected so far.
    #[must_use]
    pub fn records(&self) -> Vec<HookRecord> {
        self.records.read().clone()
    }

    /// Returns the records for one hook, in emission order.
    #[must_use]
    pub fn records_for_hook(&self, hook: &str) -> Vec<HookRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.hook == hook)
            .cloned()
            .collect()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drops all collected records.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl LogSink for CollectingLogSink {
    fn record(&self, record: HookRecord) {
        self.records.write().push(record);
    }
}

/// Interceptor that times every handler invocation and emits a
/// [`HookRecord`] to its sink.
pub struct TimingInterceptor {
    sink: Arc<dyn LogSink>,
}

impl TimingInterceptor {
    /// Creates an interceptor emitting to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

struct TimingObserver {
    sink: Arc<dyn LogSink>,
    meta: TapMeta,
    start_ms: f64,
    started: Instant,
}

impl TimingObserver {
    fn emit(self, record_type: RecordType, error: Option<String>) {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.sink.record(HookRecord {
            record_type,
            hook: self.meta.hook,
            plugin: self.meta.tap,
            start_ms: self.start_ms,
            end_ms: self.start_ms + duration_ms,
            duration_ms,
            error,
        });
    }
}

impl InvocationObserver for TimingObserver {
    fn on_success(self: Box<Self>) {
        self.emit(RecordType::Hook, None);
    }

    fn on_error(self: Box<Self>, error: &anyhow::Error) {
        self.emit(RecordType::Error, Some(error.to_string()));
    }
}

#[allow(clippy::cast_precision_loss)]
fn epoch_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

impl HookInterceptor for TimingInterceptor {
    fn on_invoke(&self, meta: &TapMeta) -> Box<dyn InvocationObserver> {
        Box::new(TimingObserver {
            sink: Arc::clone(&self.sink),
            meta: meta.clone(),
            start_ms: epoch_ms(),
            started: Instant::now(),
        })
    }
}

/// Installs a timing interceptor on all seven hooks of `pipeline`.
///
/// Safe to call before or after plugin registration; interceptors replay
/// registration events for taps already present.
pub fn instrument_pipeline(pipeline: &Pipeline, sink: Arc<dyn LogSink>) {
    let hooks = &pipeline.hooks;
    hooks
        .init_engine
        .intercept(Arc::new(TimingInterceptor::new(Arc::clone(&sink))));
    hooks
        .resource_load
        .intercept(Arc::new(TimingInterceptor::new(Arc::clone(&sink))));
    hooks
        .resource_parse
        .intercept(Arc::new(TimingInterceptor::new(Arc::clone(&sink))));
    hooks
        .build_scene
        .intercept(Arc::new(TimingInterceptor::new(Arc::clone(&sink))));
    hooks
        .render_loop
        .intercept(Arc::new(TimingInterceptor::new(Arc::clone(&sink))));
    hooks
        .post_process
        .intercept(Arc::new(TimingInterceptor::new(Arc::clone(&sink))));
    hooks
        .dispose
        .intercept(Arc::new(TimingInterceptor::new(sink)));
}
