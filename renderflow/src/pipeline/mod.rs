//! The pipeline orchestrator: six ordered stage hooks plus teardown.

mod stage;

mod integration_tests;

pub use stage::Stage;

use crate::adapter::{EngineAdapter, FrameCallback};
use crate::cancellation::CancellationToken;
use crate::context::{RenderRequest, RunContext, RunState, SurfaceHandle};
use crate::errors::PipelineError;
use crate::hooks::{BailHook, ParallelHook, SeriesHook, SyncHook, WaterfallHook};
use crate::plugin::Plugin;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the `resourceParse` bail stage.
///
/// A handler returning the continue sentinel (`None`) passes control to the
/// next validator; the first `Some` verdict stops the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseVerdict {
    /// The asset is valid; proceed to scene building.
    Accepted,
    /// The asset is rejected; `run` fails with
    /// [`PipelineError::ValidationRejected`].
    Rejected {
        /// Why the asset was rejected.
        reason: String,
    },
}

impl ParseVerdict {
    /// Convenience constructor for the rejection verdict.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// The seven hooks owned by a pipeline, one per stage plus teardown.
///
/// Handler payload is the shared run-context; registration order is dispatch
/// order within each hook.
pub struct StageHooks {
    /// Engine initialization. Series: sequential, side effects.
    pub init_engine: SeriesHook<Arc<RunContext>>,
    /// Asset retrieval. Waterfall: each handler's context feeds the next.
    pub resource_load: WaterfallHook<Arc<RunContext>>,
    /// Asset parsing/validation. Bail: first verdict wins.
    pub resource_parse: BailHook<Arc<RunContext>, ParseVerdict>,
    /// Scene construction. Waterfall.
    pub build_scene: WaterfallHook<Arc<RunContext>>,
    /// Per-frame dispatch. Parallel: all handlers per tick, failures
    /// isolated.
    pub render_loop: ParallelHook<Arc<RunContext>>,
    /// One-shot finalization. Series.
    pub post_process: SeriesHook<Arc<RunContext>>,
    /// Teardown. Sync: per-handler failure isolation.
    pub dispose: SyncHook<Arc<RunContext>>,
}

impl StageHooks {
    fn new() -> Self {
        Self {
            init_engine: SeriesHook::new(Stage::InitEngine.as_str()),
            resource_load: WaterfallHook::new(Stage::ResourceLoad.as_str()),
            resource_parse: BailHook::new(Stage::ResourceParse.as_str()),
            build_scene: WaterfallHook::new(Stage::BuildScene.as_str()),
            render_loop: ParallelHook::new(Stage::RenderLoop.as_str()),
            post_process: SeriesHook::new(Stage::PostProcess.as_str()),
            dispose: SyncHook::new(Stage::Dispose.as_str()),
        }
    }
}

/// Coordinates one rendering session as an ordered sequence of extensible
/// stages.
///
/// The pipeline owns the stage hooks and the run/dispose lifecycle; all
/// engine work happens in handlers that plugins registered. See the crate
/// docs for the stage order and dispatch semantics.
pub struct Pipeline {
    /// The stage hooks plugins tap into.
    pub hooks: StageHooks,
    adapter: Arc<dyn EngineAdapter>,
    plugin_names: RwLock<Vec<String>>,
}

impl Pipeline {
    /// Creates a pipeline around an engine adapter.
    #[must_use]
    pub fn new(adapter: Arc<dyn EngineAdapter>) -> Arc<Self> {
        Arc::new(Self {
            hooks: StageHooks::new(),
            adapter,
            plugin_names: RwLock::new(Vec::new()),
        })
    }

    /// The adapter this pipeline was built around.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn EngineAdapter> {
        &self.adapter
    }

    /// Registers a plugin by invoking its `apply`.
    ///
    /// Must happen before `run` for the registrations to be observed by that
    /// run; hooks snapshot their taps at dispatch start.
    pub fn use_plugin(&self, plugin: &dyn Plugin) {
        debug!(plugin = plugin.name(), "registering plugin");
        plugin.apply(self);
        self.plugin_names.write().push(plugin.name().to_string());
    }

    /// Registers a list of plugins in argument order.
    pub fn use_preset(&self, plugins: &[Arc<dyn Plugin>]) {
        for plugin in plugins {
            self.use_plugin(plugin.as_ref());
        }
    }

    /// Names of the plugins registered so far, in registration order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugin_names.read().clone()
    }

    /// Executes the stage sequence against a fresh run-context.
    ///
    /// Cancellation is checked before each pre-render stage; a set flag
    /// fails the run with [`PipelineError::Cancelled`] and skips everything
    /// after it, including the render loop. See the module docs for the
    /// frame-loop hand-off rules.
    pub async fn run(
        self: &Arc<Self>,
        surface: SurfaceHandle,
        request: RenderRequest,
    ) -> Result<Arc<RunContext>, PipelineError> {
        self.run_with_token(surface, request, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but with a caller-supplied cancellation
    /// token.
    ///
    /// Lets the caller request cancellation before or during the run without
    /// holding the context; a token cancelled up front fails the run at the
    /// first stage check.
    pub async fn run_with_token(
        self: &Arc<Self>,
        surface: SurfaceHandle,
        request: RenderRequest,
        cancellation: Arc<CancellationToken>,
    ) -> Result<Arc<RunContext>, PipelineError> {
        let ctx = RunContext::new(
            request,
            surface,
            Arc::clone(&self.adapter),
            cancellation,
            Arc::downgrade(self),
        );
        debug!(run_id = %ctx.run_id, request = %ctx.request.id, "pipeline run starting");

        self.check_cancelled(&ctx, Stage::InitEngine)?;
        ctx.set_state(RunState::Initializing);
        self.hooks.init_engine.call(Arc::clone(&ctx)).await?;

        self.check_cancelled(&ctx, Stage::ResourceLoad)?;
        ctx.set_state(RunState::ResourceLoading);
        let ctx = self.hooks.resource_load.call(ctx).await?;

        self.check_cancelled(&ctx, Stage::ResourceParse)?;
        ctx.set_state(RunState::Parsing);
        let verdict = self.hooks.resource_parse.call(Arc::clone(&ctx)).await?;
        if let Some(ParseVerdict::Rejected { reason }) = verdict {
            return Err(PipelineError::ValidationRejected { reason });
        }

        self.check_cancelled(&ctx, Stage::BuildScene)?;
        ctx.set_state(RunState::SceneBuilding);
        let ctx = self.hooks.build_scene.call(ctx).await?;

        ctx.render_state.set_running(true);
        ctx.set_state(RunState::RenderingActive);
        if self.adapter.supports_frame_driving() {
            self.hand_off_frame_loop(&ctx);
        } else {
            // No frame driver: one awaited dispatch as a setup opportunity.
            if let Err(err) = self.hooks.render_loop.call(Arc::clone(&ctx)).await {
                ctx.render_state.record_error(PipelineError::FrameHandler(err));
            }
        }

        ctx.set_state(RunState::PostProcessing);
        self.hooks.post_process.call(Arc::clone(&ctx)).await?;

        ctx.set_state(RunState::Completed);
        debug!(run_id = %ctx.run_id, "pipeline run completed");
        Ok(ctx)
    }

    fn check_cancelled(&self, ctx: &RunContext, stage: Stage) -> Result<(), PipelineError> {
        if ctx.is_cancelled() {
            ctx.set_state(RunState::Cancelled);
            return Err(PipelineError::Cancelled {
                stage,
                reason: ctx
                    .cancellation
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string()),
            });
        }
        Ok(())
    }

    fn hand_off_frame_loop(self: &Arc<Self>, ctx: &Arc<RunContext>) {
        let pipeline = Arc::clone(self);
        let frame_ctx = Arc::clone(ctx);
        let on_frame: FrameCallback = Arc::new(move |_delta| {
            let pipeline = Arc::clone(&pipeline);
            let ctx = Arc::clone(&frame_ctx);
            Box::pin(async move {
                pipeline.drive_frame(ctx).await;
            })
        });
        self.adapter.start_render_loop(Arc::clone(ctx), on_frame);
    }

    /// Dispatches one frame tick.
    ///
    /// Ticks never overlap: if the previous tick's dispatch has not settled,
    /// this one is coalesced. A representative handler failure is recorded
    /// into `render_state.last_error` and never reaches the frame driver.
    async fn drive_frame(&self, ctx: Arc<RunContext>) {
        if ctx.is_cancelled() {
            return;
        }
        if !ctx.render_state.try_begin_tick() {
            debug!(run_id = %ctx.run_id, "frame tick coalesced");
            return;
        }
        ctx.render_state.advance_frame();
        let outcome = self.hooks.render_loop.call(Arc::clone(&ctx)).await;
        if let Err(err) = outcome {
            warn!(run_id = %ctx.run_id, error = %err, "render loop handler failed");
            ctx.render_state.record_error(PipelineError::FrameHandler(err));
        }
        ctx.render_state.end_tick();
    }

    /// Tears a run down.
    ///
    /// Sets the cancellation flag (idempotent), then on the first call
    /// only fires the `dispose` hook with per-handler failure isolation
    /// and invokes the adapter's teardown. Never raises; calling twice is a
    /// no-op beyond re-setting flags.
    pub fn dispose(&self, ctx: &Arc<RunContext>) {
        ctx.cancel("disposed");
        ctx.render_state.set_running(false);

        if !ctx.mark_disposed() {
            return;
        }

        for failure in self.hooks.dispose.call(Arc::clone(ctx)) {
            warn!(run_id = %ctx.run_id, error = %failure, "dispose handler failed");
        }
        self.adapter.dispose();
        ctx.set_state(RunState::Disposed);
        debug!(run_id = %ctx.run_id, "pipeline run disposed");
    }
}
