//! Cross-cutting instrumentation for pipeline hooks.

mod instrument;

pub use instrument::{
    instrument_pipeline, CollectingLogSink, HookRecord, LogSink, RecordType, TimingInterceptor,
    TracingLogSink,
};
