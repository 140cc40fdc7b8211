//! Error taxonomy for pipeline execution.
//!
//! Cleanup failures (dispose-hook handlers and stage cleanups) are not part
//! of this taxonomy: they are isolated and logged, never propagated.

use crate::hooks::TapError;
use crate::pipeline::Stage;
use thiserror::Error;

/// The error type returned by [`Pipeline::run`](crate::pipeline::Pipeline::run)
/// and stored in [`RenderState::last_error`](crate::context::RenderState).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A pre-stage cancellation check failed; later stages were skipped.
    #[error("pipeline cancelled before stage '{stage}': {reason}")]
    Cancelled {
        /// The stage that was about to be dispatched.
        stage: Stage,
        /// The cancellation reason.
        reason: String,
    },

    /// A `resourceParse` handler bailed with the rejection verdict.
    #[error("resource validation rejected: {reason}")]
    ValidationRejected {
        /// The reason supplied by the rejecting handler.
        reason: String,
    },

    /// A handler failed inside a series, waterfall, or bail dispatch.
    #[error("{0}")]
    Handler(#[from] TapError),

    /// A render-loop handler failed. Captured into
    /// `renderState.last_error`; never returned from `run` and never
    /// propagated to the frame driver.
    #[error("render loop: {0}")]
    FrameHandler(TapError),

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns true for the cancellation variant.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true for the validation-rejection variant.
    #[must_use]
    pub const fn is_validation_rejected(&self) -> bool {
        matches!(self, Self::ValidationRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_display_names_the_stage() {
        let err = PipelineError::Cancelled {
            stage: Stage::BuildScene,
            reason: "user navigated away".to_string(),
        };
        assert!(err.to_string().contains("buildScene"));
        assert!(err.is_cancelled());
    }

    #[test]
    fn handler_error_preserves_attribution() {
        let tap = TapError {
            hook: "resourceLoad".to_string(),
            tap: "Loader".to_string(),
            cause: anyhow::anyhow!("404"),
        };
        let err = PipelineError::from(tap);
        assert!(err.to_string().contains("resourceLoad"));
        assert!(err.to_string().contains("404"));
    }
}
