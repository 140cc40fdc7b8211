//! Fixed stage names for the rendering pipeline.

use serde::{Deserialize, Serialize};

/// One named phase of the pipeline, in fixed dispatch order, plus the
/// teardown hook.
///
/// String forms match the hook names plugins see in instrumentation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Engine initialization (series).
    InitEngine,
    /// Raw asset retrieval (waterfall).
    ResourceLoad,
    /// Asset parsing and validation (bail).
    ResourceParse,
    /// Scene construction (waterfall).
    BuildScene,
    /// Per-frame dispatch (parallel, repeated).
    RenderLoop,
    /// One-shot finalization after the loop is handed off (series).
    PostProcess,
    /// Teardown (sync).
    Dispose,
}

impl Stage {
    /// The six stage hooks in dispatch order, excluding teardown.
    pub const ORDERED: [Self; 6] = [
        Self::InitEngine,
        Self::ResourceLoad,
        Self::ResourceParse,
        Self::BuildScene,
        Self::RenderLoop,
        Self::PostProcess,
    ];

    /// The hook name for this stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitEngine => "initEngine",
            Self::ResourceLoad => "resourceLoad",
            Self::ResourceParse => "resourceParse",
            Self::BuildScene => "buildScene",
            Self::RenderLoop => "renderLoop",
            Self::PostProcess => "postProcess",
            Self::Dispose => "dispose",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
