//! Boundary contract with the external engine adapter.
//!
//! The adapter performs the actual engine work (initialization, asset fetch,
//! parsing, scene construction, frame driving). It is consumed by plugins
//! from within stage handlers; the orchestrator itself only touches the
//! frame-driving and teardown capabilities.

use crate::context::{RunContext, SurfaceHandle};
use crate::hooks::BoxFuture;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-frame callback handed to the adapter's frame driver.
///
/// The argument is the delta time since the previous tick. A well-behaved
/// driver awaits the returned future before the next tick; a non-awaiting
/// driver is still safe because the orchestrator coalesces ticks whose
/// previous dispatch has not settled.
pub type FrameCallback = Arc<dyn Fn(f64) -> BoxFuture<()> + Send + Sync>;

/// The external engine collaborator.
///
/// `init_engine` through `build_scene` are invoked by plugin handlers, not by
/// the orchestrator; their payloads flow through the run-context handoff
/// slots as untyped JSON.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// The adapter's name, for logs.
    fn name(&self) -> &str;

    /// Initializes the engine against the caller's surface, returning
    /// engine-side handles.
    async fn init_engine(
        &self,
        surface: &SurfaceHandle,
        ctx: &RunContext,
        options: Option<serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value>;

    /// Retrieves a raw asset from a source locator.
    async fn load_resource(
        &self,
        source: &str,
        ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value>;

    /// Parses a raw asset into the adapter's scene-buildable form.
    async fn parse_resource(
        &self,
        raw: &serde_json::Value,
        ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value>;

    /// Constructs the scene graph from a parsed asset.
    async fn build_scene(
        &self,
        parsed: &serde_json::Value,
        ctx: &RunContext,
    ) -> anyhow::Result<()>;

    /// Returns true if this adapter can drive the render loop.
    fn supports_frame_driving(&self) -> bool {
        false
    }

    /// Registers the per-frame callback with the adapter's frame driver.
    ///
    /// Drivers must observe `ctx.cancellation` and cease invoking the
    /// callback once cancelled. The default does nothing, matching
    /// [`supports_frame_driving`](Self::supports_frame_driving) = false.
    fn start_render_loop(&self, _ctx: Arc<RunContext>, _on_frame: FrameCallback) {}

    /// Releases all adapter-owned resources.
    ///
    /// The orchestrator calls this at most once per run.
    fn dispose(&self) {}
}
