//! Test doubles for the adapter boundary.
//!
//! Used by this crate's own tests and available to downstream crates that
//! need a driver-paced loop without a real engine.

use crate::adapter::{EngineAdapter, FrameCallback};
use crate::context::{RunContext, SurfaceHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Frame driver with explicit, test-controlled ticks.
///
/// Holds the callback the orchestrator hands over and replays it once per
/// [`tick`](Self::tick). Respects the run-context's cancellation flag:
/// ticks after cancellation are not delivered.
#[derive(Default)]
pub struct ManualFrameDriver {
    registered: Mutex<Option<(Arc<RunContext>, FrameCallback)>>,
}

impl ManualFrameDriver {
    /// Creates an idle driver.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, ctx: Arc<RunContext>, on_frame: FrameCallback) {
        *self.registered.lock() = Some((ctx, on_frame));
    }

    /// Returns true once the orchestrator has handed a callback over.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.lock().is_some()
    }

    /// Delivers one frame tick and waits for its dispatch to settle.
    ///
    /// Returns false if no callback is registered or the run was cancelled.
    pub async fn tick(&self, delta: f64) -> bool {
        let registered = self.registered.lock().clone();
        match registered {
            Some((ctx, on_frame)) if !ctx.is_cancelled() => {
                on_frame(delta).await;
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for ManualFrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFrameDriver")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Adapter double with per-operation call counters and canned JSON payloads.
///
/// Without a driver it reports no frame-driving capability, so `run`
/// dispatches the render loop exactly once; with
/// [`with_frame_driver`](Self::with_frame_driver) the loop is handed to the
/// driver and tests pace it via [`ManualFrameDriver::tick`].
#[derive(Default)]
pub struct MockEngineAdapter {
    init_calls: AtomicUsize,
    load_calls: AtomicUsize,
    parse_calls: AtomicUsize,
    build_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
    driver: Option<Arc<ManualFrameDriver>>,
}

impl MockEngineAdapter {
    /// Creates an adapter without frame driving.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter that hands the render loop to `driver`.
    #[must_use]
    pub fn with_frame_driver(driver: Arc<ManualFrameDriver>) -> Self {
        Self {
            driver: Some(driver),
            ..Self::default()
        }
    }

    /// Number of `init_engine` calls.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `load_resource` calls.
    #[must_use]
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `parse_resource` calls.
    #[must_use]
    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    /// Number of `build_scene` calls.
    #[must_use]
    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    /// Number of `dispose` calls.
    #[must_use]
    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockEngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngineAdapter")
            .field("init_calls", &self.init_calls())
            .field("load_calls", &self.load_calls())
            .field("dispose_calls", &self.dispose_calls())
            .finish()
    }
}

#[async_trait]
impl EngineAdapter for MockEngineAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn init_engine(
        &self,
        surface: &SurfaceHandle,
        _ctx: &RunContext,
        options: Option<serde_json::Value>,
    ) -> anyhow::Result<serde_json::Value> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({
            "engine": "mock",
            "surface": surface.id,
            "options": options,
        }))
    }

    async fn load_resource(
        &self,
        source: &str,
        _ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "source": source, "bytes": 1024 }))
    }

    async fn parse_resource(
        &self,
        raw: &serde_json::Value,
        _ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "parsed": true, "raw": raw }))
    }

    async fn build_scene(
        &self,
        _parsed: &serde_json::Value,
        _ctx: &RunContext,
    ) -> anyhow::Result<()> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_frame_driving(&self) -> bool {
        self.driver.is_some()
    }

    fn start_render_loop(&self, ctx: Arc<RunContext>, on_frame: FrameCallback) {
        if let Some(driver) = &self.driver {
            driver.register(ctx, on_frame);
        }
    }

    fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
    }
}
