//! Plugin registration surface and stock plugins.

use crate::context::RunContext;
use crate::pipeline::Pipeline;
use std::sync::Arc;

/// A named unit of behavior that registers handlers into one or more hooks.
///
/// Plugins are never revisited after registration; they act purely through
/// the handlers they installed. Any state they need lives in their closures
/// or in the run-context's metadata bag.
pub trait Plugin: Send + Sync {
    /// The plugin's name, used as the registration name for its taps.
    fn name(&self) -> &str;

    /// Performs the plugin's hook registrations.
    fn apply(&self, pipeline: &Pipeline);
}

/// Closure-to-plugin adapter for inline registrations.
///
/// ```rust,ignore
/// pipeline.use_plugin(&FnPlugin::new("Counters", |p| {
///     p.hooks.post_process.tap("Counters", |ctx| async move {
///         tracing::info!(frames = ctx.render_state.frame_count(), "run finished");
///         Ok(())
///     });
/// }));
/// ```
pub struct FnPlugin {
    name: String,
    apply: Box<dyn Fn(&Pipeline) + Send + Sync>,
}

impl FnPlugin {
    /// Creates a plugin from a name and an apply closure.
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&Pipeline) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }
}

impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, pipeline: &Pipeline) {
        (self.apply)(pipeline);
    }
}

/// Stock plugin wiring the engine adapter into the four pre-render stages.
///
/// - `initEngine`: `adapter.init_engine` result into `engine_handles`.
/// - `resourceLoad`: `adapter.load_resource(request.source)` into
///   `raw_assets`.
/// - `resourceParse`: `adapter.parse_resource` into `parsed_asset`. Returns
///   the continue sentinel so validators registered after it still run.
/// - `buildScene`: `adapter.build_scene(parsed_asset)`.
///
/// Request options are forwarded to `init_engine` when non-null.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterBridgePlugin;

impl AdapterBridgePlugin {
    /// The registration name used for every tap.
    pub const NAME: &'static str = "AdapterBridge";

    /// Creates the bridge plugin.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for AdapterBridgePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, pipeline: &Pipeline) {
        pipeline
            .hooks
            .init_engine
            .tap(Self::NAME, |ctx: Arc<RunContext>| async move {
                let options = match &ctx.request.options {
                    serde_json::Value::Null => None,
                    other => Some(other.clone()),
                };
                let handles = ctx
                    .adapter
                    .init_engine(&ctx.surface, &ctx, options)
                    .await?;
                ctx.engine_handles.set(handles);
                Ok(())
            });

        pipeline
            .hooks
            .resource_load
            .tap(Self::NAME, |ctx: Arc<RunContext>| async move {
                let raw = ctx.adapter.load_resource(&ctx.request.source, &ctx).await?;
                ctx.raw_assets.set(raw);
                Ok(ctx)
            });

        pipeline
            .hooks
            .resource_parse
            .tap(Self::NAME, |ctx: Arc<RunContext>| async move {
                if let Some(raw) = ctx.raw_assets.get() {
                    let parsed = ctx.adapter.parse_resource(&raw, &ctx).await?;
                    ctx.parsed_asset.set(parsed);
                }
                Ok(None)
            });

        pipeline
            .hooks
            .build_scene
            .tap(Self::NAME, |ctx: Arc<RunContext>| async move {
                let parsed = ctx
                    .parsed_asset
                    .get()
                    .or_else(|| ctx.raw_assets.get())
                    .unwrap_or(serde_json::Value::Null);
                ctx.adapter.build_scene(&parsed, &ctx).await?;
                Ok(ctx)
            });
    }
}
