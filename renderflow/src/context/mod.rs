//! The mutable run-context threaded through every stage of one pipeline
//! execution.

mod metadata;

pub use metadata::MetadataBag;

use crate::adapter::EngineAdapter;
use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;
use crate::pipeline::Pipeline;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Description of what to render, supplied by the caller. Immutable after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Caller-chosen identifier for the request.
    pub id: String,
    /// Locator of the asset to render (URL, path, or adapter-defined).
    pub source: String,
    /// Free-form options forwarded to adapter/plugin code.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl RenderRequest {
    /// Creates a request with null options.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            options: serde_json::Value::Null,
        }
    }

    /// Sets the free-form options.
    #[must_use]
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// Opaque reference to the drawing surface the caller provided.
///
/// The core never interprets it; plugins hand it to the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceHandle {
    /// Host-side identifier of the surface.
    pub id: String,
}

impl SurfaceHandle {
    /// Creates a handle for the given host surface id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Lifecycle state of one run-context.
///
/// `RenderingActive` is not exited by normal stage completion; it persists
/// until cancellation or disposal, while `PostProcessing` and `Completed`
/// happen once regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Context created, no stage dispatched yet.
    Idle,
    /// `initEngine` dispatching.
    Initializing,
    /// `resourceLoad` dispatching.
    ResourceLoading,
    /// `resourceParse` dispatching.
    Parsing,
    /// `buildScene` dispatching.
    SceneBuilding,
    /// Render loop handed off to the frame driver.
    RenderingActive,
    /// `postProcess` dispatching.
    PostProcessing,
    /// `run` returned successfully.
    Completed,
    /// A pre-stage cancellation check failed.
    Cancelled,
    /// `dispose` ran. Terminal.
    Disposed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::ResourceLoading => "resourceLoading",
            Self::Parsing => "parsing",
            Self::SceneBuilding => "sceneBuilding",
            Self::RenderingActive => "renderingActive",
            Self::PostProcessing => "postProcessing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Render-loop bookkeeping, mutated by the frame-loop driver and by
/// render-stage handlers.
#[derive(Debug, Default)]
pub struct RenderState {
    running: AtomicBool,
    frame_count: AtomicU64,
    last_error: Mutex<Option<PipelineError>>,
    tick_in_flight: AtomicBool,
}

impl RenderState {
    /// Returns true while the render loop is logically active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// The number of frame ticks dispatched so far. Non-decreasing.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    pub(crate) fn advance_frame(&self) -> u64 {
        self.frame_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records a per-frame failure. Later successful ticks do not clear it.
    pub fn record_error(&self, error: PipelineError) {
        *self.last_error.lock() = Some(error);
    }

    /// Returns true if any frame tick has failed.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.last_error.lock().is_some()
    }

    /// The message of the most recent recorded failure.
    #[must_use]
    pub fn last_error_message(&self) -> Option<String> {
        self.last_error.lock().as_ref().map(ToString::to_string)
    }

    /// Marks a tick dispatch as started; false means a previous tick has not
    /// settled yet and this one should be coalesced.
    pub(crate) fn try_begin_tick(&self) -> bool {
        self.tick_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn end_tick(&self) {
        self.tick_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Untyped handoff slot populated by adapter/plugin code as stages progress.
///
/// The orchestrator never reads or writes these.
#[derive(Debug, Default)]
pub struct HandoffSlot {
    value: RwLock<Option<serde_json::Value>>,
}

impl HandoffSlot {
    /// Stores a value, replacing any previous one.
    pub fn set(&self, value: serde_json::Value) {
        *self.value.write() = Some(value);
    }

    /// Returns a clone of the stored value.
    #[must_use]
    pub fn get(&self) -> Option<serde_json::Value> {
        self.value.read().clone()
    }

    /// Removes and returns the stored value.
    #[must_use]
    pub fn take(&self) -> Option<serde_json::Value> {
        self.value.write().take()
    }

    /// Returns true if a value is stored.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value.read().is_some()
    }
}

/// The mutable record threaded through all stages of one `run` invocation.
///
/// Created exactly once per run and never shared across concurrent runs; all
/// handlers receive the same `Arc` and mutate it in place through the
/// interior-mutability fields.
pub struct RunContext {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// What to render. Immutable.
    pub request: RenderRequest,
    /// The caller's drawing surface. Immutable.
    pub surface: SurfaceHandle,
    /// The external engine adapter. Shared, never reassigned mid-run.
    pub adapter: Arc<dyn EngineAdapter>,
    /// Inter-plugin coordination surface.
    pub metadata: MetadataBag,
    /// Cooperative cancellation channel.
    pub cancellation: Arc<CancellationToken>,
    /// Frame-loop bookkeeping.
    pub render_state: RenderState,
    /// Raw assets produced by `resourceLoad` handlers.
    pub raw_assets: HandoffSlot,
    /// Parsed asset produced by `resourceParse` handlers.
    pub parsed_asset: HandoffSlot,
    /// Engine-side handles produced by `initEngine` handlers.
    pub engine_handles: HandoffSlot,

    pipeline: Weak<Pipeline>,
    state: RwLock<RunState>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("request", &self.request)
            .field("surface", &self.surface)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .field("frame_count", &self.render_state.frame_count())
            .finish()
    }
}

impl RunContext {
    pub(crate) fn new(
        request: RenderRequest,
        surface: SurfaceHandle,
        adapter: Arc<dyn EngineAdapter>,
        cancellation: Arc<CancellationToken>,
        pipeline: Weak<Pipeline>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_id: Uuid::new_v4(),
            request,
            surface,
            adapter,
            metadata: MetadataBag::new(),
            cancellation,
            render_state: RenderState::default(),
            raw_assets: HandoffSlot::default(),
            parsed_asset: HandoffSlot::default(),
            engine_handles: HandoffSlot::default(),
            pipeline,
            state: RwLock::new(RunState::Idle),
            disposed: AtomicBool::new(false),
        })
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Requests cooperative cancellation. Irreversible.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancellation.cancel(reason);
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: RunState) {
        *self.state.write() = state;
    }

    /// The owning pipeline, if it is still alive.
    #[must_use]
    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.upgrade()
    }

    /// True once `dispose` has run on this context.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::SeqCst)
    }

    /// Tears this run down via the owning pipeline.
    ///
    /// A no-op beyond setting the cancellation flag if the pipeline is gone
    /// or the context is already disposed.
    pub fn dispose(self: &Arc<Self>) {
        match self.pipeline() {
            Some(pipeline) => pipeline.dispose(self),
            None => self.cancel("pipeline dropped"),
        }
    }
}
