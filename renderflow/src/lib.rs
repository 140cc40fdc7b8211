//! # Renderflow
//!
//! A pluggable, hook-driven orchestrator for 3D rendering sessions.
//!
//! Renderflow coordinates one rendering run as an ordered sequence of
//! extensible stages. The rendering itself is delegated to an external
//! engine adapter; what this crate provides is the orchestration:
//!
//! - **Hook engine**: generic dispatch primitives with five semantics
//!   (series, waterfall, bail, parallel, sync)
//! - **Run-context**: a shared mutable record threaded through every stage
//! - **Stage coordination**: advisory locks, deferred cleanups, and
//!   completion flags for mutually-unaware plugins
//! - **Instrumentation**: transparent per-handler timing records
//! - **Lifecycle**: cooperative cancellation and best-effort teardown
//!
//! Stage order: `initEngine` → `resourceLoad` → `resourceParse` →
//! `buildScene` → `renderLoop` (repeated, driver-paced) → `postProcess`,
//! with a `dispose` teardown hook.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use renderflow::prelude::*;
//!
//! let pipeline = Pipeline::new(adapter);
//! pipeline.use_plugin(&AdapterBridgePlugin::new());
//! pipeline.use_plugin(&my_environment_plugin);
//!
//! let ctx = pipeline
//!     .run(SurfaceHandle::new("canvas"), RenderRequest::new("helmet", url))
//!     .await?;
//!
//! // ... later
//! pipeline.dispose(&ctx);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapter;
pub mod cancellation;
pub mod context;
pub mod errors;
pub mod hooks;
pub mod observability;
pub mod pipeline;
pub mod plugin;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{EngineAdapter, FrameCallback};
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{
        HandoffSlot, MetadataBag, RenderRequest, RunContext, RunState, SurfaceHandle,
    };
    pub use crate::errors::PipelineError;
    pub use crate::hooks::{
        BailHook, HookInterceptor, InvocationObserver, ParallelHook, SeriesHook, SyncHook,
        TapError, TapMeta, WaterfallHook,
    };
    pub use crate::observability::{
        instrument_pipeline, CollectingLogSink, HookRecord, LogSink, TracingLogSink,
    };
    pub use crate::pipeline::{ParseVerdict, Pipeline, Stage, StageHooks};
    pub use crate::plugin::{AdapterBridgePlugin, FnPlugin, Plugin};
}
